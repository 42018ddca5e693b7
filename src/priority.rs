use crate::error::PoolError;

use std::fmt;
use std::str::FromStr;

/// Scheduling preference of a submitted task.
///
/// Ordering only affects which queue the dispatch loop pulls from next; a
/// running task is never preempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
  High,
  Normal,
  Low,
}

impl Priority {
  /// All levels, most preferred first.
  pub const ALL: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];

  pub(crate) fn index(self) -> usize {
    match self {
      Priority::High => 0,
      Priority::Normal => 1,
      Priority::Low => 2,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Priority::High => "high",
      Priority::Normal => "normal",
      Priority::Low => "low",
    }
  }
}

impl fmt::Display for Priority {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Priority {
  type Err = PoolError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "high" => Ok(Priority::High),
      "normal" => Ok(Priority::Normal),
      "low" => Ok(Priority::Low),
      _ => Err(PoolError::InvalidPriority(s.to_string())),
    }
  }
}

impl TryFrom<u8> for Priority {
  type Error = PoolError;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      0 => Ok(Priority::High),
      1 => Ok(Priority::Normal),
      2 => Ok(Priority::Low),
      other => Err(PoolError::InvalidPriority(other.to_string())),
    }
  }
}
