//! Governor configuration.

use std::path::PathBuf;
use std::time::Duration;

use headroom_common::{HeadroomError, HeadroomResult, HostPaths};

use crate::estimator::{CPU_PERIOD_USEC, DEFAULT_MARGIN, MIN_CPU_QUOTA_USEC};

/// Default tick interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Governor configuration options.
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    /// Where `/proc` and the cgroup v2 hierarchy live.
    pub paths: HostPaths,
    /// Fraction of machine capacity kept free.
    pub margin: f64,
    /// Time between ticks.
    pub interval: Duration,
    /// `cpu.max` period, in microseconds.
    pub cpu_period_usec: u64,
    /// Mount point for write benchmarks; `None` skips them.
    pub scratch_dir: Option<PathBuf>,
    /// Skip the disk benchmark entirely.
    pub skip_benchmark: bool,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            paths: HostPaths::new(),
            margin: DEFAULT_MARGIN,
            interval: DEFAULT_INTERVAL,
            cpu_period_usec: CPU_PERIOD_USEC,
            scratch_dir: None,
            skip_benchmark: false,
        }
    }
}

impl GovernorConfig {
    /// Set host paths.
    #[must_use]
    pub fn with_paths(mut self, paths: HostPaths) -> Self {
        self.paths = paths;
        self
    }

    /// Set the margin.
    #[must_use]
    pub const fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    /// Set the tick interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Enable write benchmarks, mounting devices at `scratch_dir`.
    #[must_use]
    pub fn with_scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(scratch_dir.into());
        self
    }

    /// Skip the disk benchmark.
    #[must_use]
    pub const fn with_skip_benchmark(mut self, skip: bool) -> Self {
        self.skip_benchmark = skip;
        self
    }

    /// Check that the values make sense.
    ///
    /// # Errors
    ///
    /// Returns [`HeadroomError::Config`] describing the first bad value.
    pub fn validate(&self) -> HeadroomResult<()> {
        if !(0.0..1.0).contains(&self.margin) {
            return Err(HeadroomError::Config {
                message: format!("margin must be in [0, 1), got {}", self.margin),
            });
        }
        if self.interval.is_zero() {
            return Err(HeadroomError::Config {
                message: "interval must be positive".to_string(),
            });
        }
        if self.cpu_period_usec < MIN_CPU_QUOTA_USEC {
            return Err(HeadroomError::Config {
                message: format!(
                    "CPU period must be at least {MIN_CPU_QUOTA_USEC}us, got {}",
                    self.cpu_period_usec
                ),
            });
        }
        Ok(())
    }
}
