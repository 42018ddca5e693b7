//! The dispatch loop and the ratio rule it applies when choosing a level.

use crate::config::FairnessRatio;
use crate::priority::Priority;
use crate::task::QueuedTask;
use crate::task_queue::{PriorityQueues, QueueSnapshot};
use crate::tracker::{ExecutionTracker, Reservation, TaskOutcome};

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::Notify;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// Counters behind the HIGH:NORMAL ratio rule.
///
/// NORMAL is preferred over pending HIGH work once `high_burst` HIGH tasks
/// have been dispatched since the last NORMAL and fewer than `normal_quota`
/// NORMAL tasks have gone out in the current window. LOW is only chosen when
/// both other levels are empty.
#[derive(Debug, Clone)]
pub(crate) struct FairnessWindow {
  ratio: FairnessRatio,
  high_since_normal: u32,
  normal_in_window: u32,
}

impl FairnessWindow {
  pub(crate) fn new(ratio: FairnessRatio) -> Self {
    Self {
      ratio,
      high_since_normal: 0,
      normal_in_window: 0,
    }
  }

  fn normal_permitted(&self) -> bool {
    self.high_since_normal >= self.ratio.high_burst && self.normal_in_window < self.ratio.normal_quota
  }

  /// Picks the level to dispatch from, or `None` when every queue is empty.
  pub(crate) fn select(&self, snapshot: QueueSnapshot) -> Option<Priority> {
    if snapshot.high {
      if snapshot.normal && self.normal_permitted() {
        Some(Priority::Normal)
      } else {
        Some(Priority::High)
      }
    } else if snapshot.normal {
      Some(Priority::Normal)
    } else if snapshot.low {
      Some(Priority::Low)
    } else {
      None
    }
  }

  /// Advances the counters after a task from `priority` was dispatched.
  pub(crate) fn record(&mut self, priority: Priority) {
    match priority {
      Priority::High => {
        self.high_since_normal = self.high_since_normal.saturating_add(1);
      }
      Priority::Normal => {
        self.normal_in_window += 1;
        if self.normal_in_window >= self.ratio.normal_quota {
          self.high_since_normal = 0;
          self.normal_in_window = 0;
        }
      }
      Priority::Low => {}
    }
  }
}

/// Everything the dispatch loop shares with the pool that owns it.
pub(crate) struct DispatchContext {
  pub(crate) pool_name: Arc<String>,
  pub(crate) queues: Arc<PriorityQueues>,
  pub(crate) tracker: Arc<ExecutionTracker>,
  pub(crate) wake: Arc<Notify>,
  pub(crate) tokio_handle: TokioHandle,
  pub(crate) shutdown_token: CancellationToken,
  /// Cancels the pool's loop-exited token once the loop is gone, including when
  /// the runtime drops the loop future or it unwinds.
  pub(crate) _exit_guard: DropGuard,
  pub(crate) poll_interval: Duration,
  pub(crate) ratio: FairnessRatio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
  Dispatched,
  Idle,
  Saturated,
}

pub(crate) async fn run_dispatch_loop(ctx: DispatchContext) {
  info!(name = %*ctx.pool_name, work_count = ctx.tracker.work_count(), "Dispatch loop started.");
  let mut window = FairnessWindow::new(ctx.ratio);

  loop {
    if ctx.shutdown_token.is_cancelled() {
      info!(name = %*ctx.pool_name, "Shutdown signal (token) received. Dispatch loop terminating.");
      break;
    }

    let step = dispatch_once(&ctx, &mut window);
    if step == Step::Dispatched {
      continue;
    }

    trace!(name = %*ctx.pool_name, ?step, "Nothing dispatched. Waiting for enqueue, release or poll interval.");
    tokio::select! {
      biased;

      _ = ctx.shutdown_token.cancelled() => {
        info!(name = %*ctx.pool_name, "Shutdown signal (token) received while waiting. Dispatch loop terminating.");
        break;
      }
      _ = ctx.wake.notified() => {}
      _ = tokio::time::sleep(ctx.poll_interval) => {}
    }
  }

  info!(
    name = %*ctx.pool_name,
    "Dispatch loop stopped. Tasks still executing: {}, still queued: {}",
    ctx.tracker.in_flight_count(),
    ctx.queues.len()
  );
}

fn dispatch_once(ctx: &DispatchContext, window: &mut FairnessWindow) -> Step {
  let mut queues = ctx.queues.lock();

  let Some(priority) = window.select(queues.snapshot()) else {
    return Step::Idle;
  };
  if !ctx.tracker.has_capacity() {
    return Step::Saturated;
  }
  let Some(queued) = queues.pop(priority) else {
    return Step::Idle;
  };
  let Some(reservation) = ctx.tracker.try_reserve(queued.task_id, priority) else {
    queues.push_front(queued);
    return Step::Saturated;
  };
  drop(queues);

  window.record(priority);
  spawn_execution(ctx, queued, reservation);
  Step::Dispatched
}

fn spawn_execution(ctx: &DispatchContext, queued: QueuedTask, reservation: Reservation) {
  let QueuedTask {
    task_id,
    priority,
    task,
    enqueued_at,
  } = queued;
  debug!(
    name = %*ctx.pool_name,
    %task_id,
    %priority,
    queued_for = ?enqueued_at.elapsed(),
    "Dequeued task. Spawning with reserved slot."
  );

  let pool_name = ctx.pool_name.clone();
  ctx.tokio_handle.spawn(
    async move {
      let reservation = reservation;
      // execute() itself runs inside the guarded future so a panic while building it is caught too.
      let outcome = match AssertUnwindSafe(async move { task.execute().await }).catch_unwind().await {
        Ok(Ok(())) => {
          trace!("Task executed successfully.");
          TaskOutcome::Succeeded
        }
        Ok(Err(task_error)) => {
          warn!(error = %task_error, "Task reported a failure.");
          TaskOutcome::Failed
        }
        Err(_panic_payload) => {
          error!("Task panicked during execution.");
          TaskOutcome::Panicked
        }
      };
      reservation.record(outcome);
      debug!(task_id = reservation.task_id(), ?outcome, "Task finished, releasing slot.");
    }
    .instrument(info_span!("pool_task", pool_name = %*pool_name, %task_id, %priority)),
  );
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::VecDeque;

  /// Replays the loop's choice sequence over in-memory lanes, ignoring capacity.
  fn replay(ratio: FairnessRatio, lanes: [&[&'static str]; 3]) -> Vec<&'static str> {
    let mut lanes: Vec<VecDeque<&'static str>> = lanes.iter().map(|l| l.iter().copied().collect()).collect();
    let mut window = FairnessWindow::new(ratio);
    let mut order = Vec::new();
    loop {
      let snapshot = QueueSnapshot {
        high: !lanes[0].is_empty(),
        normal: !lanes[1].is_empty(),
        low: !lanes[2].is_empty(),
      };
      let Some(priority) = window.select(snapshot) else {
        break;
      };
      order.extend(lanes[priority.index()].pop_front());
      window.record(priority);
    }
    order
  }

  #[test]
  fn test_five_high_one_normal() {
    let order = replay(
      FairnessRatio::default(),
      [&["H1", "H2", "H3", "H4", "H5"], &["N1"], &[]],
    );
    assert_eq!(order, vec!["H1", "H2", "H3", "N1", "H4", "H5"]);
  }

  #[test]
  fn test_sustained_cadence_is_three_to_one() {
    let highs = ["H"; 9];
    let normals = ["N"; 5];
    let order = replay(FairnessRatio::default(), [&highs, &normals, &[]]);
    assert_eq!(
      order,
      vec!["H", "H", "H", "N", "H", "H", "H", "N", "H", "H", "H", "N", "N", "N"]
    );
  }

  #[test]
  fn test_low_waits_for_both_higher_levels() {
    let order = replay(FairnessRatio::default(), [&["H"], &["N"], &["L"]]);
    assert_eq!(order, vec!["H", "N", "L"]);

    let order = replay(FairnessRatio::default(), [&["H"; 6], &[], &["L", "L"]]);
    assert_eq!(order, vec!["H", "H", "H", "H", "H", "H", "L", "L"]);
  }

  #[test]
  fn test_normal_runs_when_high_is_empty() {
    let window = FairnessWindow::new(FairnessRatio::default());
    let snapshot = QueueSnapshot {
      high: false,
      normal: true,
      low: true,
    };
    assert_eq!(window.select(snapshot), Some(Priority::Normal));
    assert_eq!(window.select(QueueSnapshot::default()), None);
  }

  #[test]
  fn test_idle_normal_dispatch_closes_window() {
    let mut window = FairnessWindow::new(FairnessRatio::default());
    let both = QueueSnapshot {
      high: true,
      normal: true,
      low: false,
    };
    window.record(Priority::High);
    window.record(Priority::High);
    // A NORMAL that ran while HIGH was empty resets the run of HIGHs.
    window.record(Priority::Normal);
    window.record(Priority::High);
    window.record(Priority::High);
    assert_eq!(window.select(both), Some(Priority::High));
    window.record(Priority::High);
    assert_eq!(window.select(both), Some(Priority::Normal));
  }

  #[test]
  fn test_low_dispatch_does_not_touch_window() {
    let mut window = FairnessWindow::new(FairnessRatio::default());
    for _ in 0..3 {
      window.record(Priority::High);
    }
    window.record(Priority::Low);
    let both = QueueSnapshot {
      high: true,
      normal: true,
      low: false,
    };
    assert_eq!(window.select(both), Some(Priority::Normal));
  }

  #[test]
  fn test_custom_ratio() {
    let order = replay(FairnessRatio::new(2, 2), [&["H"; 4], &["N"; 4], &[]]);
    assert_eq!(order, vec!["H", "H", "N", "N", "H", "H", "N", "N"]);
  }
}
