//! Worker pool configuration.
use std::{fmt, str::FromStr, time::Duration};

use super::Error;

/// Number of worker processes to fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCount {
    /// One worker per available processing unit.
    Auto,
    /// Fixed number of workers, values below one are treated as one.
    Fixed(i64),
}

impl WorkerCount {
    /// Resolve to the number of workers to fork.
    ///
    /// The result is never less than one.
    pub fn resolve(&self, available: usize) -> usize {
        match *self {
            WorkerCount::Auto => available.max(1),
            WorkerCount::Fixed(count) => {
                usize::try_from(count.max(1)).unwrap_or(usize::MAX)
            }
        }
    }
}

impl Default for WorkerCount {
    fn default() -> Self {
        WorkerCount::Fixed(2)
    }
}

impl From<i64> for WorkerCount {
    fn from(count: i64) -> Self {
        WorkerCount::Fixed(count)
    }
}

impl FromStr for WorkerCount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.eq_ignore_ascii_case("auto") {
            return Ok(WorkerCount::Auto);
        }
        value
            .parse::<i64>()
            .map(WorkerCount::Fixed)
            .map_err(|_| Error::InvalidCount(s.to_string()))
    }
}

impl fmt::Display for WorkerCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerCount::Auto => write!(f, "auto"),
            WorkerCount::Fixed(count) => write!(f, "{}", count),
        }
    }
}

/// Resolved worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkersConfig {
    /// Number of workers to fork.
    pub count: WorkerCount,
    /// Exit the process after an uncaught panic so the
    /// primary can replace it.
    pub restart_on_fault: bool,
    /// Delay before a dead worker is replaced.
    pub restart_delay: Duration,
    /// Time workers are given to exit after a shutdown
    /// signal before the primary exits forcibly.
    pub shutdown_grace: Duration,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: WorkerCount::default(),
            restart_on_fault: true,
            restart_delay: Duration::from_millis(1000),
            shutdown_grace: Duration::from_millis(30000),
        }
    }
}

impl WorkersConfig {
    /// Overlay the overrides that are set, keeping the
    /// current value of every other field.
    pub fn merge(self, overrides: WorkersOverrides) -> Self {
        Self {
            count: overrides.count.unwrap_or(self.count),
            restart_on_fault: overrides
                .restart_on_fault
                .unwrap_or(self.restart_on_fault),
            restart_delay: overrides.restart_delay.unwrap_or(self.restart_delay),
            shutdown_grace: overrides
                .shutdown_grace
                .unwrap_or(self.shutdown_grace),
        }
    }
}

/// Partial worker pool settings supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkersOverrides {
    /// Number of workers to fork.
    pub count: Option<WorkerCount>,
    /// Exit after an uncaught panic.
    pub restart_on_fault: Option<bool>,
    /// Delay before a dead worker is replaced.
    pub restart_delay: Option<Duration>,
    /// Grace window for shutdown.
    pub shutdown_grace: Option<Duration>,
}
