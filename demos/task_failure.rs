use priority_orchestra::{BlockingTask, Priority, PriorityPool, TaskError};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Task Failure Example ---");

  let pool = PriorityPool::new(1, Handle::current(), "failure_pool").expect("work count is positive");

  let failing = || async {
    tokio::time::sleep(Duration::from_millis(50)).await;
    Err::<(), TaskError>(TaskError::new("upstream unavailable"))
  };
  let panicking = BlockingTask::new(|| -> Result<(), TaskError> {
    panic!("This task is designed to panic!");
  });
  let healthy = BlockingTask::new(|| {
    info!("Healthy blocking task ran after the failures.");
    Ok(())
  });

  pool.submit(Arc::new(failing), Priority::High);
  pool.submit(Arc::new(panicking), Priority::Normal);
  pool.submit(Arc::new(healthy), Priority::Low);

  tokio::time::sleep(Duration::from_millis(300)).await;
  info!("Stats after failures: {:?}", pool.stats());

  let summary = pool.shutdown(Duration::from_secs(1)).await;
  info!("Pool shutdown complete: {:?}", summary);
  info!("--- Task Failure Example End ---");
}
