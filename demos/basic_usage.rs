use priority_orchestra::{Priority, PriorityPool, TaskError};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

async fn work_task_fn(id: usize, duration_ms: u64) -> Result<(), TaskError> {
  info!("Task {} starting (will run for {}ms)", id, duration_ms);
  tokio::time::sleep(Duration::from_millis(duration_ms)).await;
  info!("Task {} finished", id);
  Ok(())
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Basic Usage Example ---");

  let pool = match PriorityPool::new(2, Handle::current(), "basic_pool") {
    Ok(pool) => pool,
    Err(e) => {
      tracing::error!("Failed to create pool: {}", e);
      return;
    }
  };

  for i in 0..4 {
    let task = move || work_task_fn(i, 200);
    if !pool.submit(Arc::new(task), Priority::Normal) {
      tracing::error!("Task {} was rejected", i);
    }
  }
  info!(
    "Submitted 4 tasks. Queued: {}, Active: {}",
    pool.queued_task_count(),
    pool.active_task_count()
  );

  tokio::time::sleep(Duration::from_millis(600)).await;
  let summary = pool.shutdown(Duration::from_secs(5)).await;
  info!("Pool shut down: {:?}, stats: {:?}", summary, pool.stats());
  info!("--- Basic Usage Example End ---");
}
