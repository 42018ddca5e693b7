use priority_orchestra::{FairnessRatio, PoolConfig, Priority, PriorityPool, Task, TaskToExecute};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

type CallLog = Arc<parking_lot::Mutex<Vec<String>>>;

// Records its label the moment it starts executing.
struct RecordingTask {
  label: String,
  calls: CallLog,
  hold: Duration,
}

impl Task for RecordingTask {
  fn execute(&self) -> TaskToExecute {
    let label = self.label.clone();
    let calls = self.calls.clone();
    let hold = self.hold;
    Box::pin(async move {
      calls.lock().push(label);
      if !hold.is_zero() {
        sleep(hold).await;
      }
      Ok(())
    })
  }
}

fn recording(label: &str, calls: &CallLog) -> Arc<RecordingTask> {
  Arc::new(RecordingTask {
    label: label.to_string(),
    calls: calls.clone(),
    hold: Duration::ZERO,
  })
}

// Helper to initialize tracing for tests
fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,priority_orchestra=debug"));
    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

async fn wait_for_calls(calls: &CallLog, expected: usize) -> Vec<String> {
  let deadline = Instant::now() + Duration::from_secs(3);
  while calls.lock().len() < expected && Instant::now() < deadline {
    sleep(Duration::from_millis(5)).await;
  }
  calls.lock().clone()
}

// Submissions below happen without awaiting, so on the current-thread runtime
// the dispatch loop first runs with every task already queued.

#[tokio::test]
async fn test_one_low_task_runs() {
  setup_tracing_for_test();
  let calls = CallLog::default();
  let pool = PriorityPool::new(1, tokio::runtime::Handle::current(), "test_pool_single_low").unwrap();

  assert!(pool.submit(recording("LOW", &calls), Priority::Low));

  assert_eq!(wait_for_calls(&calls, 1).await, vec!["LOW"]);
  pool.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_normal_runs_before_low() {
  setup_tracing_for_test();
  let calls = CallLog::default();
  let pool = PriorityPool::new(1, tokio::runtime::Handle::current(), "test_pool_low_then_normal").unwrap();

  assert!(pool.submit(recording("LOW", &calls), Priority::Low));
  assert!(pool.submit(recording("NORMAL", &calls), Priority::Normal));

  assert_eq!(wait_for_calls(&calls, 2).await, vec!["NORMAL", "LOW"]);
  pool.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_high_normal_low_order() {
  setup_tracing_for_test();
  let calls = CallLog::default();
  let pool = PriorityPool::new(1, tokio::runtime::Handle::current(), "test_pool_three_levels").unwrap();

  assert!(pool.submit(recording("LOW", &calls), Priority::Low));
  assert!(pool.submit(recording("HIGH", &calls), Priority::High));
  assert!(pool.submit(recording("NORMAL", &calls), Priority::Normal));

  assert_eq!(wait_for_calls(&calls, 3).await, vec!["HIGH", "NORMAL", "LOW"]);
  pool.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_six_high_two_low_single_worker() {
  setup_tracing_for_test();
  let calls = CallLog::default();
  let pool = PriorityPool::new(1, tokio::runtime::Handle::current(), "test_pool_six_high_two_low").unwrap();

  for _ in 0..6 {
    assert!(pool.submit(recording("HIGH", &calls), Priority::High));
  }
  for _ in 0..2 {
    assert!(pool.submit(recording("LOW", &calls), Priority::Low));
  }

  let observed = wait_for_calls(&calls, 8).await;
  assert_eq!(observed, vec!["HIGH", "HIGH", "HIGH", "HIGH", "HIGH", "HIGH", "LOW", "LOW"]);
  pool.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_ratio_with_ample_capacity() {
  setup_tracing_for_test();
  let calls = CallLog::default();
  let pool = PriorityPool::new(8, tokio::runtime::Handle::current(), "test_pool_ratio_ample").unwrap();

  for i in 1..=5 {
    assert!(pool.submit(recording(&format!("H{i}"), &calls), Priority::High));
  }
  assert!(pool.submit(recording("N1", &calls), Priority::Normal));

  let observed = wait_for_calls(&calls, 6).await;
  assert_eq!(&observed[..5], &["H1", "H2", "H3", "N1", "H4"]);
  assert_eq!(observed[5], "H5");
  pool.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_sustained_stream_interleaves_three_to_one() {
  setup_tracing_for_test();
  let calls = CallLog::default();
  let pool = PriorityPool::new(1, tokio::runtime::Handle::current(), "test_pool_sustained_ratio").unwrap();

  for _ in 0..9 {
    assert!(pool.submit(recording("H", &calls), Priority::High));
  }
  for _ in 0..3 {
    assert!(pool.submit(recording("N", &calls), Priority::Normal));
  }

  let observed = wait_for_calls(&calls, 12).await;
  assert_eq!(observed, vec!["H", "H", "H", "N", "H", "H", "H", "N", "H", "H", "H", "N"]);
  pool.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_fifo_within_each_level() {
  setup_tracing_for_test();
  let calls = CallLog::default();
  let pool = PriorityPool::new(1, tokio::runtime::Handle::current(), "test_pool_fifo").unwrap();

  for i in 0..10 {
    assert!(pool.submit(recording(&format!("L{i}"), &calls), Priority::Low));
  }

  let observed = wait_for_calls(&calls, 10).await;
  let expected: Vec<String> = (0..10).map(|i| format!("L{i}")).collect();
  assert_eq!(observed, expected);
  pool.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_low_waits_while_higher_work_arrives() {
  setup_tracing_for_test();
  let calls = CallLog::default();
  let pool = PriorityPool::new(1, tokio::runtime::Handle::current(), "test_pool_low_gated").unwrap();

  let blocker = Arc::new(RecordingTask {
    label: "BLOCKER".to_string(),
    calls: calls.clone(),
    hold: Duration::from_millis(100),
  });
  assert!(pool.submit(blocker, Priority::Normal));
  assert_eq!(wait_for_calls(&calls, 1).await, vec!["BLOCKER"]);

  // Worker is busy: queue LOW first, then higher levels behind it.
  assert!(pool.submit(recording("LOW", &calls), Priority::Low));
  assert!(pool.submit(recording("NORMAL", &calls), Priority::Normal));
  assert!(pool.submit(recording("HIGH", &calls), Priority::High));

  let observed = wait_for_calls(&calls, 4).await;
  assert_eq!(observed, vec!["BLOCKER", "HIGH", "NORMAL", "LOW"]);
  pool.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_custom_ratio_from_config() {
  setup_tracing_for_test();
  let calls = CallLog::default();
  let config = PoolConfig::new(1)
    .with_name("test_pool_custom_ratio")
    .with_ratio(FairnessRatio::new(1, 1));
  let pool = PriorityPool::with_config(config, tokio::runtime::Handle::current()).unwrap();

  for _ in 0..3 {
    assert!(pool.submit(recording("H", &calls), Priority::High));
    assert!(pool.submit(recording("N", &calls), Priority::Normal));
  }

  let observed = wait_for_calls(&calls, 6).await;
  assert_eq!(observed, vec!["H", "N", "H", "N", "H", "N"]);
  pool.shutdown(Duration::from_secs(1)).await;
}
