//! A Tokio-based fixed-size worker pool with three priority levels.
//!
//! HIGH work is preferred, NORMAL work is guaranteed a slot after every run of
//! HIGH dispatches, LOW work fills idle periods. At most `work_count` tasks
//! execute at once, and shutdown drains in-flight work within a timeout.

mod config;
mod error;
mod manager;
mod priority;
mod scheduler;
mod task;
mod task_queue;
mod tracker;

pub use config::{FairnessRatio, PoolConfig};
pub use error::{PoolError, TaskError};
pub use manager::{PoolState, PriorityPool, ShutdownSummary};
pub use priority::Priority;
pub use task::{BlockingTask, Task, TaskResult, TaskToExecute};
pub use tracker::PoolStats;
