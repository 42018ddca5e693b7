use crate::priority::Priority;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// Point-in-time counters for a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
  /// Tasks handed to execution since the pool started.
  pub dispatched: u64,
  /// Executions whose future returned `Ok`.
  pub succeeded: u64,
  /// Executions whose future returned `Err`.
  pub failed: u64,
  /// Executions that panicked.
  pub panicked: u64,
  /// Tasks currently executing.
  pub in_flight: usize,
  /// Highest number of simultaneously executing tasks observed.
  pub peak_in_flight: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskOutcome {
  Succeeded,
  Failed,
  Panicked,
}

#[derive(Debug)]
pub(crate) struct InFlightEntry {
  pub(crate) priority: Priority,
  pub(crate) started_at: Instant,
}

#[derive(Debug, Default)]
struct Counters {
  dispatched: AtomicU64,
  succeeded: AtomicU64,
  failed: AtomicU64,
  panicked: AtomicU64,
  peak_in_flight: AtomicUsize,
}

/// Bookkeeping of dispatched-but-unfinished work.
///
/// The concurrency cap is a semaphore with `work_count` permits. A slot is
/// held by a [`Reservation`] for the whole execution and returned when the
/// reservation is dropped.
#[derive(Debug)]
pub(crate) struct ExecutionTracker {
  work_count: usize,
  slots: Arc<Semaphore>,
  in_flight: DashMap<u64, InFlightEntry>,
  dispatcher_wake: Arc<Notify>,
  idle: Notify,
  counters: Counters,
}

impl ExecutionTracker {
  pub(crate) fn new(work_count: usize, dispatcher_wake: Arc<Notify>) -> Arc<Self> {
    Arc::new(Self {
      work_count,
      slots: Arc::new(Semaphore::new(work_count)),
      in_flight: DashMap::with_capacity(work_count),
      dispatcher_wake,
      idle: Notify::new(),
      counters: Counters::default(),
    })
  }

  /// Registers `task_id` as in flight if a slot is free.
  ///
  /// Acquiring the permit is the cap check, so concurrent callers can never
  /// over-admit.
  pub(crate) fn try_reserve(self: &Arc<Self>, task_id: u64, priority: Priority) -> Option<Reservation> {
    let permit = self.slots.clone().try_acquire_owned().ok()?;

    self.in_flight.insert(
      task_id,
      InFlightEntry {
        priority,
        started_at: Instant::now(),
      },
    );
    let running = self.in_flight.len();
    self.counters.peak_in_flight.fetch_max(running, Ordering::Relaxed);
    self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
    trace!(%task_id, %priority, running, "Reserved execution slot.");

    Some(Reservation {
      task_id,
      tracker: self.clone(),
      permit: Some(permit),
    })
  }

  pub(crate) fn work_count(&self) -> usize {
    self.work_count
  }

  /// Size of the in-flight set. Entries are inserted only while holding a
  /// permit and removed before it is returned, so this never exceeds the cap.
  pub(crate) fn in_flight_count(&self) -> usize {
    self.in_flight.len()
  }

  pub(crate) fn has_capacity(&self) -> bool {
    self.slots.available_permits() > 0
  }

  #[cfg(test)]
  pub(crate) fn is_in_flight(&self, task_id: u64) -> bool {
    self.in_flight.contains_key(&task_id)
  }

  /// Resolves once nothing is executing.
  pub(crate) async fn wait_idle(&self) {
    loop {
      let notified = self.idle.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();
      if self.in_flight_count() == 0 {
        return;
      }
      notified.await;
    }
  }

  pub(crate) fn stats(&self) -> PoolStats {
    PoolStats {
      dispatched: self.counters.dispatched.load(Ordering::Relaxed),
      succeeded: self.counters.succeeded.load(Ordering::Relaxed),
      failed: self.counters.failed.load(Ordering::Relaxed),
      panicked: self.counters.panicked.load(Ordering::Relaxed),
      in_flight: self.in_flight_count(),
      peak_in_flight: self.counters.peak_in_flight.load(Ordering::Relaxed),
    }
  }

  fn record_outcome(&self, outcome: TaskOutcome) {
    let counter = match outcome {
      TaskOutcome::Succeeded => &self.counters.succeeded,
      TaskOutcome::Failed => &self.counters.failed,
      TaskOutcome::Panicked => &self.counters.panicked,
    };
    counter.fetch_add(1, Ordering::Relaxed);
  }

  fn release(&self, task_id: u64) -> Option<Duration> {
    let entry = self.in_flight.remove(&task_id).map(|(_, entry)| entry);
    let remaining = self.in_flight.len();
    trace!(%task_id, remaining, priority = ?entry.as_ref().map(|e| e.priority), "Released execution slot.");
    entry.map(|e| e.started_at.elapsed())
  }
}

/// An occupied execution slot.
///
/// Dropping it releases the slot exactly once, whether the task returned,
/// failed, panicked or was dropped by the runtime.
#[derive(Debug)]
pub(crate) struct Reservation {
  task_id: u64,
  tracker: Arc<ExecutionTracker>,
  permit: Option<OwnedSemaphorePermit>,
}

impl Reservation {
  pub(crate) fn task_id(&self) -> u64 {
    self.task_id
  }

  pub(crate) fn record(&self, outcome: TaskOutcome) {
    self.tracker.record_outcome(outcome);
  }
}

impl Drop for Reservation {
  fn drop(&mut self) {
    let ran_for = self.tracker.release(self.task_id);
    // Entry is gone before the permit frees, keeping the in-flight set within the cap.
    drop(self.permit.take());
    trace!(task_id = %self.task_id, ?ran_for, "Slot returned to pool.");

    self.tracker.dispatcher_wake.notify_one();
    if self.tracker.in_flight_count() == 0 {
      self.tracker.idle.notify_waiters();
    }
  }
}
