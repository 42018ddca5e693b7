use crate::error::TaskError;
use crate::priority::Priority;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of a single task execution.
pub type TaskResult = Result<(), TaskError>;

/// The future a task hands to the pool when it is dispatched.
pub type TaskToExecute = Pin<Box<dyn Future<Output = TaskResult> + Send + 'static>>;

/// A unit of work the pool can run.
///
/// The pool calls `execute` once, when the task is dispatched, and drives the
/// returned future on its runtime. Whatever the future does is the caller's
/// business; the pool only notes whether it returned `Ok`, `Err` or panicked.
pub trait Task: Send + Sync + 'static {
  fn execute(&self) -> TaskToExecute;
}

impl<F, Fut> Task for F
where
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = TaskResult> + Send + 'static,
{
  fn execute(&self) -> TaskToExecute {
    Box::pin(self())
  }
}

/// Adapter for synchronous, CPU-bound work.
///
/// The closure runs on Tokio's blocking thread pool so it does not stall the
/// runtime the dispatch loop lives on. A panic in the closure is re-raised in
/// the task future and counted as a panicked task.
pub struct BlockingTask<F> {
  work: Arc<F>,
}

impl<F> BlockingTask<F>
where
  F: Fn() -> TaskResult + Send + Sync + 'static,
{
  pub fn new(work: F) -> Self {
    Self { work: Arc::new(work) }
  }
}

impl<F> fmt::Debug for BlockingTask<F> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BlockingTask").finish_non_exhaustive()
  }
}

impl<F> Task for BlockingTask<F>
where
  F: Fn() -> TaskResult + Send + Sync + 'static,
{
  fn execute(&self) -> TaskToExecute {
    let work = self.work.clone();
    Box::pin(async move {
      match tokio::task::spawn_blocking(move || (*work)()).await {
        Ok(result) => result,
        Err(join_error) if join_error.is_panic() => std::panic::resume_unwind(join_error.into_panic()),
        Err(join_error) => Err(TaskError::new(format!("blocking task did not complete: {join_error}"))),
      }
    })
  }
}

/// Internal representation of a task waiting in one of the priority queues.
pub(crate) struct QueuedTask {
  pub(crate) task_id: u64,
  pub(crate) priority: Priority,
  pub(crate) task: Arc<dyn Task>,
  pub(crate) enqueued_at: Instant,
}

impl fmt::Debug for QueuedTask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueuedTask")
      .field("task_id", &self.task_id)
      .field("priority", &self.priority)
      .finish_non_exhaustive()
  }
}
