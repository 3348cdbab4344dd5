//! CPU quota estimator.

use serde::{Deserialize, Serialize};

use super::{MIN_CPU_QUOTA_USEC, control_law};
use crate::cgroup::CpuMax;
use crate::system::CpuTimes;

/// Cumulative CPU counters taken together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSample {
    /// Machine-wide CPU times.
    pub system: CpuTimes,
    /// CPU time consumed by the governed group, in microseconds.
    pub cgroup_usage_usec: u64,
}

/// Compute a `cpu.max` quota from one interval's deltas (all in µs).
///
/// `delta_idle` is the machine's idle capacity (`idle + iowait`) over the
/// interval. Returns `None` when `delta_total` is zero or the margin is not
/// a number. The quota is clamped to `[MIN_CPU_QUOTA_USEC, period]`, and a
/// period shorter than the minimum quota is raised to it.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn cpu_quota(
    delta_cgroup: u64,
    delta_total: u64,
    delta_idle: u64,
    margin: f64,
    period_usec: u64,
) -> Option<u64> {
    if delta_total == 0 {
        return None;
    }

    let total = delta_total as f64;
    let available = delta_idle.min(delta_total) as f64;
    let target = control_law(delta_cgroup as f64, available, total * margin);

    let quota = period_usec as f64 * target / total;
    if quota.is_nan() {
        return None;
    }

    let ceiling = period_usec.max(MIN_CPU_QUOTA_USEC) as f64;
    Some(quota.clamp(MIN_CPU_QUOTA_USEC as f64, ceiling) as u64)
}

/// Stateful CPU estimator holding the previous sample.
#[derive(Debug, Clone)]
pub struct CpuEstimator {
    last: Option<CpuSample>,
    margin: f64,
    period_usec: u64,
}

impl CpuEstimator {
    /// Create an estimator with no baseline.
    #[must_use]
    pub const fn new(margin: f64, period_usec: u64) -> Self {
        Self {
            last: None,
            margin,
            period_usec,
        }
    }

    /// Store a baseline without computing anything.
    pub const fn record(&mut self, sample: CpuSample) {
        self.last = Some(sample);
    }

    /// The stored sample.
    #[must_use]
    pub const fn last(&self) -> Option<&CpuSample> {
        self.last.as_ref()
    }

    /// Compute the next quota and make `now` the new baseline.
    ///
    /// Returns `None` on the first sample or when no CPU time elapsed.
    pub fn estimate(&mut self, now: CpuSample) -> Option<CpuMax> {
        let last = self.last.replace(now)?;

        let delta_cgroup = now.cgroup_usage_usec.saturating_sub(last.cgroup_usage_usec);
        let delta_total = now.system.total().saturating_sub(last.system.total());
        let delta_idle = now
            .system
            .idle_capacity()
            .saturating_sub(last.system.idle_capacity());

        let quota = cpu_quota(
            delta_cgroup,
            delta_total,
            delta_idle,
            self.margin,
            self.period_usec,
        );

        tracing::trace!(
            delta_cgroup,
            delta_total,
            delta_idle,
            quota = ?quota,
            "CPU estimate"
        );

        quota.map(|quota_usec| CpuMax {
            quota_usec,
            period_usec: self.period_usec,
        })
    }
}
