//! Per-device I/O bandwidth estimator.

use std::collections::HashMap;
use std::time::Duration;

use super::control_law;
use crate::benchmark::DeviceBenchmark;
use crate::cgroup::IoLimit;
use crate::device::{DeviceCatalog, DeviceNumber, IoCounters, IoDirection};

/// Stateful I/O estimator holding the previous system and cgroup counters.
#[derive(Debug, Clone)]
pub struct IoEstimator {
    last_system: HashMap<String, IoCounters>,
    last_cgroup: HashMap<DeviceNumber, IoCounters>,
    margin: f64,
}

impl IoEstimator {
    /// Create an estimator with no baseline.
    #[must_use]
    pub fn new(margin: f64) -> Self {
        Self {
            last_system: HashMap::new(),
            last_cgroup: HashMap::new(),
            margin,
        }
    }

    /// Store a baseline without computing anything.
    pub fn record(
        &mut self,
        system: HashMap<String, IoCounters>,
        cgroup: HashMap<DeviceNumber, IoCounters>,
    ) {
        self.last_system = system;
        self.last_cgroup = cgroup;
    }

    /// Compute byte-rate caps for every benchmarked disk.
    ///
    /// `window` is the time between the stored sample and this one. Disks
    /// without a stored sample, a zero ceiling, or a non-positive target get
    /// no entry. The new counters always become the baseline.
    pub fn estimate(
        &mut self,
        system: HashMap<String, IoCounters>,
        cgroup: HashMap<DeviceNumber, IoCounters>,
        catalog: &DeviceCatalog,
        benchmarks: &HashMap<String, DeviceBenchmark>,
        window: Duration,
    ) -> Vec<IoLimit> {
        let mut limits = Vec::new();
        let seconds = window.as_secs_f64();

        if seconds > 0.0 {
            for disk in catalog.disks() {
                let Some(now_system) = system.get(&disk.kernel_name) else {
                    continue;
                };
                let Some(last_system) = self.last_system.get(&disk.kernel_name) else {
                    tracing::trace!(device = %disk.kernel_name, "No previous disk sample");
                    continue;
                };
                let Some(benchmark) = benchmarks.get(&disk.kernel_name) else {
                    continue;
                };

                let now_cgroup = cgroup.get(&disk.number).copied().unwrap_or_default();
                let last_cgroup = self
                    .last_cgroup
                    .get(&disk.number)
                    .copied()
                    .unwrap_or_default();

                for direction in IoDirection::ALL {
                    let ceiling = benchmark.get(direction).as_bytes_per_second();
                    let Some(bytes_per_second) = io_limit(
                        now_cgroup.get(direction).saturating_sub(last_cgroup.get(direction)),
                        now_system.get(direction).saturating_sub(last_system.get(direction)),
                        ceiling,
                        seconds,
                        self.margin,
                    ) else {
                        continue;
                    };

                    limits.push(IoLimit {
                        device: disk.number,
                        direction,
                        bytes_per_second,
                    });
                }
            }
        }

        self.last_system = system;
        self.last_cgroup = cgroup;
        limits
    }
}

/// Byte-rate cap for one device and direction.
///
/// Deltas are in bytes over `seconds`; `ceiling` is the benchmarked maximum
/// in bytes per second. Returns `None` for a zero ceiling or when the target
/// truncates to zero or below.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn io_limit(delta_cgroup: u64, delta_system: u64, ceiling: u64, seconds: f64, margin: f64) -> Option<u64> {
    if ceiling == 0 {
        return None;
    }

    let cgroup_rate = delta_cgroup as f64 / seconds;
    let system_rate = delta_system as f64 / seconds;
    let ceiling = ceiling as f64;

    let available = (ceiling - system_rate).max(0.0);
    let target = control_law(cgroup_rate, available, ceiling * margin).trunc();

    (target >= 1.0).then(|| target as u64)
}
