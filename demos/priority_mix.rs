use priority_orchestra::{Priority, PriorityPool, Task, TaskToExecute};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

struct LabelledJob {
  label: String,
}

impl Task for LabelledJob {
  fn execute(&self) -> TaskToExecute {
    let label = self.label.clone();
    Box::pin(async move {
      info!("Running {}", label);
      tokio::time::sleep(Duration::from_millis(50)).await;
      Ok(())
    })
  }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::INFO)
    .with_target(false)
    .init();
  info!("--- Priority Mix Example (single worker) ---");

  let pool = PriorityPool::new(1, Handle::current(), "priority_mix_pool").expect("work count is positive");

  // Nothing is dispatched until main first yields, so the whole mix is queued.
  // Expected dispatch: H0 H1 H2 N0 H3 H4 H5 N1 N2 L0 L1
  for i in 0..2 {
    pool.submit(Arc::new(LabelledJob { label: format!("LOW-{i}") }), Priority::Low);
  }
  for i in 0..3 {
    pool.submit(Arc::new(LabelledJob { label: format!("NORMAL-{i}") }), Priority::Normal);
  }
  for i in 0..6 {
    pool.submit(Arc::new(LabelledJob { label: format!("HIGH-{i}") }), Priority::High);
  }

  tokio::time::sleep(Duration::from_millis(800)).await;
  let summary = pool.stop().await;
  info!("Shutdown summary: {:?}", summary);
  info!("--- Priority Mix Example End ---");
}
