//! Tick orchestration.
//!
//! A [`ResourceGovernor`] owns the estimator state and runs one
//! snapshot → estimate → apply pass per call to [`ResourceGovernor::tick`].
//! The [`MonitorLoop`] drives it on a fixed interval.

mod monitor;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use headroom_common::HeadroomResult;
use parking_lot::Mutex;

use crate::benchmark::DeviceBenchmark;
use crate::cgroup::{ResourceController, ResourceLimits};
use crate::device::DeviceCatalog;
use crate::estimator::{CpuEstimator, CpuSample, IoEstimator, estimate_memory_ceiling};
use crate::runtime::GovernorConfig;
use crate::system::SystemSource;

pub use monitor::MonitorLoop;

/// State carried from one tick to the next.
#[derive(Debug)]
struct GovernorState {
    cpu: CpuEstimator,
    io: IoEstimator,
    last_limits: Option<ResourceLimits>,
    ticks: u64,
}

/// Computes and applies limits for one governed group.
#[derive(Debug)]
pub struct ResourceGovernor<C, S> {
    controller: Arc<C>,
    system: S,
    catalog: DeviceCatalog,
    benchmarks: HashMap<String, DeviceBenchmark>,
    margin: f64,
    interval: Duration,
    state: Mutex<GovernorState>,
}

impl<C: ResourceController, S: SystemSource> ResourceGovernor<C, S> {
    /// Create a governor with no disks to limit.
    ///
    /// # Errors
    ///
    /// Returns [`HeadroomError::Config`](headroom_common::HeadroomError::Config)
    /// if `config` does not validate.
    pub fn new(controller: Arc<C>, system: S, config: &GovernorConfig) -> HeadroomResult<Self> {
        config.validate()?;

        Ok(Self {
            controller,
            system,
            catalog: DeviceCatalog::default(),
            benchmarks: HashMap::new(),
            margin: config.margin,
            interval: config.interval,
            state: Mutex::new(GovernorState {
                cpu: CpuEstimator::new(config.margin, config.cpu_period_usec),
                io: IoEstimator::new(config.margin),
                last_limits: None,
                ticks: 0,
            }),
        })
    }

    /// Limit I/O on the disks in `catalog` against their benchmarked ceilings.
    #[must_use]
    pub fn with_devices(
        mut self,
        catalog: DeviceCatalog,
        benchmarks: HashMap<String, DeviceBenchmark>,
    ) -> Self {
        self.catalog = catalog;
        self.benchmarks = benchmarks;
        self
    }

    /// Tick interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Take the baseline samples without applying anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the system or the cgroup cannot be read.
    pub fn initialize(&self) -> HeadroomResult<()> {
        let mut state = self.state.lock();

        let system = self.system.snapshot()?;
        let cgroup = self.controller.read_stats()?;

        state.cpu.record(CpuSample {
            system: system.cpu,
            cgroup_usage_usec: cgroup.cpu_usage_usec,
        });
        state.io.record(system.disks, cgroup.io);

        tracing::debug!(
            memory_total = system.memory.total_bytes,
            memory_available = system.memory.available_bytes,
            cgroup_cpu_usec = cgroup.cpu_usage_usec,
            "Recorded baseline"
        );
        Ok(())
    }

    /// Run one tick and return what was written.
    ///
    /// # Errors
    ///
    /// Returns an error if a read or a limit write fails.
    pub fn tick(&self) -> HeadroomResult<ResourceLimits> {
        let mut state = self.state.lock();

        let system = self.system.snapshot()?;
        let cgroup = self.controller.read_stats()?;

        // An unbounded group has no ceiling yet; start from what it uses.
        let memory_base = cgroup.memory_ceiling.unwrap_or(cgroup.memory_current);
        let memory_max = estimate_memory_ceiling(
            memory_base,
            system.memory.available_bytes,
            system.memory.total_bytes,
            self.margin,
        );

        let cpu = state.cpu.estimate(CpuSample {
            system: system.cpu,
            cgroup_usage_usec: cgroup.cpu_usage_usec,
        });

        let io = state.io.estimate(
            system.disks,
            cgroup.io,
            &self.catalog,
            &self.benchmarks,
            self.interval,
        );

        let limits = ResourceLimits {
            memory_max,
            cpu,
            io,
        };
        self.controller.apply_limits(&limits)?;

        state.ticks += 1;
        tracing::debug!(
            tick = state.ticks,
            memory_max = ?limits.memory_max,
            cpu_quota = ?limits.cpu.map(|c| c.quota_usec),
            io_limits = limits.io.len(),
            "Applied limits"
        );
        state.last_limits = Some(limits.clone());

        Ok(limits)
    }

    /// Limits written by the most recent tick.
    #[must_use]
    pub fn last_limits(&self) -> Option<ResourceLimits> {
        self.state.lock().last_limits.clone()
    }

    /// Number of completed ticks.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.state.lock().ticks
    }
}
