use crate::priority::Priority;
use crate::task::QueuedTask;

use std::collections::VecDeque;

use parking_lot::Mutex;

/// Which levels currently hold at least one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct QueueSnapshot {
  pub(crate) high: bool,
  pub(crate) normal: bool,
  pub(crate) low: bool,
}

impl QueueSnapshot {
  #[cfg(test)]
  pub(crate) fn is_empty(&self) -> bool {
    !(self.high || self.normal || self.low)
  }
}

/// Three independent FIFO queues, one per priority level.
///
/// All levels share one lock so a snapshot, the pop that follows it, and an
/// undo via `push_front` are consistent with each other.
#[derive(Debug, Default)]
pub(crate) struct PriorityQueues {
  lanes: Mutex<[VecDeque<QueuedTask>; 3]>,
}

impl PriorityQueues {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn lock(&self) -> QueuesGuard<'_> {
    QueuesGuard {
      lanes: self.lanes.lock(),
    }
  }

  pub(crate) fn push(&self, task: QueuedTask) {
    self.lock().push(task);
  }

  #[cfg(test)]
  pub(crate) fn snapshot(&self) -> QueueSnapshot {
    self.lock().snapshot()
  }

  pub(crate) fn len(&self) -> usize {
    self.lanes.lock().iter().map(VecDeque::len).sum()
  }

  pub(crate) fn len_of(&self, priority: Priority) -> usize {
    self.lanes.lock()[priority.index()].len()
  }

  /// Discards every queued task and returns how many were dropped.
  pub(crate) fn drain_all(&self) -> usize {
    let mut lanes = self.lanes.lock();
    lanes.iter_mut().map(|lane| lane.drain(..).count()).sum()
  }
}

/// Exclusive access to all three queues for the duration of one dispatch step.
pub(crate) struct QueuesGuard<'a> {
  lanes: parking_lot::MutexGuard<'a, [VecDeque<QueuedTask>; 3]>,
}

impl QueuesGuard<'_> {
  pub(crate) fn push(&mut self, task: QueuedTask) {
    self.lanes[task.priority.index()].push_back(task);
  }

  /// Puts a task back at the head of its level, undoing a `pop`.
  pub(crate) fn push_front(&mut self, task: QueuedTask) {
    self.lanes[task.priority.index()].push_front(task);
  }

  pub(crate) fn pop(&mut self, priority: Priority) -> Option<QueuedTask> {
    self.lanes[priority.index()].pop_front()
  }

  pub(crate) fn snapshot(&self) -> QueueSnapshot {
    QueueSnapshot {
      high: !self.lanes[Priority::High.index()].is_empty(),
      normal: !self.lanes[Priority::Normal.index()].is_empty(),
      low: !self.lanes[Priority::Low.index()].is_empty(),
    }
  }
}
