use crate::error::PoolError;

use std::time::Duration;

const DEFAULT_POOL_NAME: &str = "priority_pool";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(20);

/// How many HIGH dispatches buy how many NORMAL ones.
///
/// After `high_burst` consecutive HIGH dispatches, up to `normal_quota` NORMAL
/// tasks are preferred over pending HIGH work before the window resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FairnessRatio {
  pub high_burst: u32,
  pub normal_quota: u32,
}

impl FairnessRatio {
  pub const fn new(high_burst: u32, normal_quota: u32) -> Self {
    Self {
      high_burst,
      normal_quota,
    }
  }
}

impl Default for FairnessRatio {
  fn default() -> Self {
    Self::new(3, 1)
  }
}

/// Settings for a [`PriorityPool`](crate::PriorityPool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
  /// Name used in log fields and spans.
  pub name: String,
  /// Maximum number of tasks executing at once.
  pub work_count: usize,
  /// Upper bound on how long the dispatch loop sleeps when idle or saturated.
  pub poll_interval: Duration,
  /// Drain timeout used by [`PriorityPool::stop`](crate::PriorityPool::stop).
  pub drain_timeout: Duration,
  pub ratio: FairnessRatio,
}

impl PoolConfig {
  pub fn new(work_count: usize) -> Self {
    Self {
      name: DEFAULT_POOL_NAME.to_string(),
      work_count,
      poll_interval: DEFAULT_POLL_INTERVAL,
      drain_timeout: DEFAULT_DRAIN_TIMEOUT,
      ratio: FairnessRatio::default(),
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
    self.poll_interval = poll_interval;
    self
  }

  pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
    self.drain_timeout = drain_timeout;
    self
  }

  pub fn with_ratio(mut self, ratio: FairnessRatio) -> Self {
    self.ratio = ratio;
    self
  }

  pub fn validate(&self) -> Result<(), PoolError> {
    if self.work_count == 0 {
      return Err(PoolError::InvalidWorkCount(self.work_count));
    }
    if self.poll_interval.is_zero() {
      return Err(PoolError::InvalidConfig("poll_interval must be non-zero".into()));
    }
    if self.ratio.high_burst == 0 || self.ratio.normal_quota == 0 {
      return Err(PoolError::InvalidConfig(format!(
        "fairness ratio components must be at least 1, got {}:{}",
        self.ratio.high_burst, self.ratio.normal_quota
      )));
    }
    Ok(())
  }
}
