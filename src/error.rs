use thiserror::Error;

/// Errors that can occur within the `priority_orchestra` pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  #[error("Worker count must be at least 1, got {0}")]
  InvalidWorkCount(usize),

  #[error("Unrecognized priority value: {0}")]
  InvalidPriority(String),

  #[error("Invalid pool configuration: {0}")]
  InvalidConfig(String),

  #[error("Pool is shutting down or already shut down, cannot accept new tasks")]
  PoolShuttingDown,
}

/// Failure reported by a task's `execute()`.
///
/// The pool logs it and counts it; it never propagates past the dispatch loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Task failed: {message}")]
pub struct TaskError {
  message: String,
}

impl TaskError {
  pub fn new(message: impl Into<String>) -> Self {
    Self { message: message.into() }
  }

  pub fn message(&self) -> &str {
    &self.message
  }
}
