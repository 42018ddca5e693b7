use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::priority::Priority;
use crate::scheduler::{run_dispatch_loop, DispatchContext};
use crate::task::{QueuedTask, Task};
use crate::task_queue::PriorityQueues;
use crate::tracker::{ExecutionTracker, PoolStats};

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_POOL_TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// Lifecycle of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
  /// Accepting and dispatching work.
  Running,
  /// Shutdown has begun: submissions are rejected and nothing new is dispatched.
  Stopping,
  /// The dispatch loop has exited and the drain finished or timed out.
  Stopped,
}

/// What a call to [`PriorityPool::shutdown`] observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSummary {
  /// `true` if every in-flight task finished before the drain timeout.
  pub drained: bool,
  /// Tasks still executing when the drain timeout elapsed.
  pub abandoned_in_flight: usize,
  /// Queued tasks that were never dispatched and have been discarded.
  pub discarded_queued: usize,
}

/// A fixed-size worker pool with HIGH, NORMAL and LOW priority queues.
///
/// A single background dispatch loop moves tasks from the queues into
/// execution, at most `work_count` at a time. HIGH work is preferred, but
/// every third HIGH dispatch (by default) lets one pending NORMAL task go
/// first; LOW work only runs when the other two queues are empty.
pub struct PriorityPool {
  pool_name: Arc<String>,
  config: PoolConfig,
  state: RwLock<PoolState>,
  queues: Arc<PriorityQueues>,
  tracker: Arc<ExecutionTracker>,
  wake: Arc<Notify>,
  shutdown_token: CancellationToken,
  loop_exited: CancellationToken,
  dispatch_join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl PriorityPool {
  /// Creates a pool running `work_count` tasks at most, with default settings.
  ///
  /// # Errors
  /// Returns `PoolError::InvalidWorkCount` if `work_count` is zero.
  pub fn new(work_count: usize, tokio_handle: TokioHandle, pool_name: &str) -> Result<Arc<Self>, PoolError> {
    Self::with_config(PoolConfig::new(work_count).with_name(pool_name), tokio_handle)
  }

  /// Creates a pool from an explicit configuration and starts its dispatch loop
  /// on `tokio_handle`.
  ///
  /// # Errors
  /// Returns the configuration's validation error.
  pub fn with_config(config: PoolConfig, tokio_handle: TokioHandle) -> Result<Arc<Self>, PoolError> {
    config.validate()?;

    let pool_name = Arc::new(config.name.clone());
    let wake = Arc::new(Notify::new());
    let queues = Arc::new(PriorityQueues::new());
    let tracker = ExecutionTracker::new(config.work_count, wake.clone());
    let shutdown_token = CancellationToken::new();
    let loop_exited = CancellationToken::new();

    let ctx = DispatchContext {
      pool_name: pool_name.clone(),
      queues: queues.clone(),
      tracker: tracker.clone(),
      wake: wake.clone(),
      tokio_handle: tokio_handle.clone(),
      shutdown_token: shutdown_token.clone(),
      _exit_guard: loop_exited.clone().drop_guard(),
      poll_interval: config.poll_interval,
      ratio: config.ratio,
    };
    let dispatch_join_handle = tokio_handle.spawn(
      run_dispatch_loop(ctx).instrument(info_span!("priority_pool_dispatch_loop", name = %*pool_name)),
    );

    info!(
      pool_name = %*pool_name,
      work_count = config.work_count,
      ratio = ?config.ratio,
      "Priority pool created."
    );

    Ok(Arc::new(Self {
      pool_name,
      config,
      state: RwLock::new(PoolState::Running),
      queues,
      tracker,
      wake,
      shutdown_token,
      loop_exited,
      dispatch_join_handle: Mutex::new(Some(dispatch_join_handle)),
    }))
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  pub fn work_count(&self) -> usize {
    self.config.work_count
  }

  pub fn state(&self) -> PoolState {
    *self.state.read()
  }

  /// Number of tasks currently executing.
  pub fn active_task_count(&self) -> usize {
    self.tracker.in_flight_count()
  }

  /// Returns the current number of tasks waiting across all queues.
  pub fn queued_task_count(&self) -> usize {
    self.queues.len()
  }

  pub fn queued_count(&self, priority: Priority) -> usize {
    self.queues.len_of(priority)
  }

  pub fn stats(&self) -> PoolStats {
    self.tracker.stats()
  }

  /// Enqueues `task` at `priority` and returns the id the pool assigned to it.
  ///
  /// # Errors
  /// Returns `PoolError::PoolShuttingDown` once shutdown has begun; the task is
  /// not enqueued.
  pub fn try_submit(&self, task: Arc<dyn Task>, priority: Priority) -> Result<u64, PoolError> {
    // Held across the enqueue so shutdown cannot slip in between check and push.
    let state = self.state.read();
    if *state != PoolState::Running {
      warn!(pool_name = %self.pool_name, %priority, "Submit: Attempted to submit task to a pool that is shutting down or stopped.");
      return Err(PoolError::PoolShuttingDown);
    }

    let task_id = NEXT_POOL_TASK_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    self.queues.push(QueuedTask {
      task_id,
      priority,
      task,
      enqueued_at: Instant::now(),
    });
    drop(state);

    self.wake.notify_one();
    debug!(pool_name = %self.pool_name, %task_id, %priority, "Task enqueued.");
    Ok(task_id)
  }

  /// Enqueues `task` at `priority`.
  ///
  /// Returns `false` without enqueuing if the pool is stopping or stopped.
  pub fn submit(&self, task: Arc<dyn Task>, priority: Priority) -> bool {
    self.try_submit(task, priority).is_ok()
  }

  /// Stops the pool.
  ///
  /// New submissions are rejected immediately and the call waits for the
  /// dispatch loop to exit, so nothing else starts. Concurrent callers all wait
  /// for the loop. The call then waits up to `drain_timeout` for the
  /// tasks that were already executing. Whatever is still queued is discarded.
  /// Executions that outlive the timeout keep running on the runtime; they are
  /// reported in the summary but not cancelled.
  pub async fn shutdown(&self, drain_timeout: Duration) -> ShutdownSummary {
    let already_initiating_shutdown = {
      let mut state = self.state.write();
      let already = *state != PoolState::Running;
      if !already {
        *state = PoolState::Stopping;
      }
      already
    };

    if already_initiating_shutdown {
      info!(pool_name = %self.pool_name, "Shutdown already in progress or completed by another call/Drop.");
    } else {
      info!(pool_name = %self.pool_name, ?drain_timeout, "Initiating pool shutdown.");
      self.shutdown_token.cancel();
    }

    let handle_to_await: Option<JoinHandle<()>> = self.dispatch_join_handle.lock().take();
    if let Some(handle) = handle_to_await {
      info!(pool_name = %self.pool_name, "Waiting for dispatch loop to join.");
      match handle.await {
        Ok(()) => info!(pool_name = %self.pool_name, "Dispatch loop successfully joined."),
        Err(join_error) => {
          error!(pool_name = %self.pool_name, "Error joining dispatch loop during shutdown: {:?}.", join_error);
        }
      }
    } else {
      trace!(pool_name = %self.pool_name, "Dispatch loop handle already taken. Waiting for the loop to exit.");
    }
    // Whoever holds the handle, no caller drains or reports Stopped before the loop is gone.
    self.loop_exited.cancelled().await;

    let in_flight_at_start = self.tracker.in_flight_count();
    info!(pool_name = %self.pool_name, in_flight = in_flight_at_start, "Draining in-flight tasks.");
    let drained = tokio::time::timeout(drain_timeout, self.tracker.wait_idle()).await.is_ok();
    let abandoned_in_flight = if drained { 0 } else { self.tracker.in_flight_count() };
    if !drained {
      warn!(
        pool_name = %self.pool_name,
        abandoned_in_flight,
        "Drain timeout elapsed with tasks still executing. Proceeding with shutdown."
      );
    }

    let discarded_queued = self.queues.drain_all();
    if discarded_queued > 0 {
      info!(pool_name = %self.pool_name, discarded_queued, "Discarded queued tasks that were never dispatched.");
    }

    *self.state.write() = PoolState::Stopped;
    info!(pool_name = %self.pool_name, drained, "Pool shutdown process completed.");

    ShutdownSummary {
      drained,
      abandoned_in_flight,
      discarded_queued,
    }
  }

  /// [`shutdown`](Self::shutdown) with the configured drain timeout.
  pub async fn stop(&self) -> ShutdownSummary {
    self.shutdown(self.config.drain_timeout).await
  }
}

impl Drop for PriorityPool {
  fn drop(&mut self) {
    let mut state = self.state.write();
    if *state == PoolState::Running {
      info!(
        pool_name = %*self.pool_name,
        "PriorityPool instance dropped. Initiating implicit shutdown (signaling dispatch loop to stop)."
      );
      *state = PoolState::Stopping;
      self.shutdown_token.cancel();
      // Executing tasks own their reservations and finish on the runtime.
      debug!(
        pool_name = %*self.pool_name,
        in_flight = self.tracker.in_flight_count(),
        "Drop: Shutdown token cancelled. Dispatch loop will terminate."
      );
    } else {
      trace!(pool_name = %*self.pool_name, "Drop: Shutdown already in progress or completed. No new signals sent.");
    }
  }
}
