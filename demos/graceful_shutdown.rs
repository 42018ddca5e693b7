use priority_orchestra::{PoolConfig, Priority, PriorityPool, TaskError};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

async fn work_task_fn(id: usize, duration_s: u64) -> Result<(), TaskError> {
  info!("Task {} starting (will run for {}s)", id, duration_s);
  tokio::time::sleep(Duration::from_secs(duration_s)).await;
  info!("Task {} finished after {}s", id, duration_s);
  Ok(())
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Graceful Shutdown Example ---");

  let config = PoolConfig::new(2)
    .with_name("graceful_shutdown_pool")
    .with_drain_timeout(Duration::from_secs(5));
  let pool = PriorityPool::with_config(config, Handle::current()).expect("valid configuration");

  // Tasks 0 and 1 start. Tasks 2, 3, 4 are queued and will be discarded.
  for i in 0..5 {
    let task = move || work_task_fn(i, 2);
    pool.submit(Arc::new(task), Priority::High);
  }
  tokio::time::sleep(Duration::from_millis(100)).await;

  let pool_for_shutdown = pool.clone();
  let shutdown_jh = tokio::spawn(async move {
    info!("Calling pool.stop()...");
    let summary = pool_for_shutdown.stop().await;
    info!("Pool shutdown call completed: {:?}", summary);
  });

  tokio::time::sleep(Duration::from_millis(50)).await;
  info!("Attempting to submit task after shutdown initiated...");
  let late = move || work_task_fn(99, 1);
  if pool.submit(Arc::new(late), Priority::High) {
    tracing::error!("LATE SUBMISSION SUCCEEDED (UNEXPECTED!)");
  } else {
    info!("Late submission correctly rejected. Pool state: {:?}", pool.state());
  }

  shutdown_jh.await.expect("Shutdown join handle failed");
  info!("--- Graceful Shutdown Example End ---");
}
