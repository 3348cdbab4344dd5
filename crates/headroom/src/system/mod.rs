//! Whole-machine resource counters.

mod sampler;

use std::collections::HashMap;

use headroom_common::HeadroomResult;
use serde::{Deserialize, Serialize};

use crate::device::IoCounters;

pub use sampler::ProcSampler;

/// Machine memory at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// Total usable RAM in bytes.
    pub total_bytes: u64,
    /// Memory available for new workloads without swapping, in bytes.
    pub available_bytes: u64,
}

/// Cumulative aggregate CPU time per category, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuTimes {
    /// Time in user mode.
    pub user: u64,
    /// Time in user mode with low priority.
    pub nice: u64,
    /// Time in kernel mode.
    pub system: u64,
    /// Idle time.
    pub idle: u64,
    /// Idle time waiting for I/O.
    pub iowait: u64,
    /// Time servicing interrupts.
    pub irq: u64,
    /// Time servicing softirqs.
    pub softirq: u64,
    /// Time stolen by the hypervisor.
    pub steal: u64,
}

impl CpuTimes {
    /// Sum of every category.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Time the CPUs had nothing to run (`idle + iowait`).
    #[must_use]
    pub const fn idle_capacity(&self) -> u64 {
        self.idle + self.iowait
    }

    /// Time the CPUs were doing work.
    #[must_use]
    pub const fn busy(&self) -> u64 {
        self.total().saturating_sub(self.idle_capacity())
    }
}

/// A point-in-time view of the machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    /// Memory totals.
    pub memory: MemoryInfo,
    /// Aggregate CPU times.
    pub cpu: CpuTimes,
    /// Disk counters keyed by kernel device name.
    pub disks: HashMap<String, IoCounters>,
}

/// Source of whole-machine counters.
pub trait SystemSource: Send + Sync {
    /// Read memory totals.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read.
    fn read_memory(&self) -> HeadroomResult<MemoryInfo>;

    /// Read aggregate CPU times.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read.
    fn read_cpu_times(&self) -> HeadroomResult<CpuTimes>;

    /// Read per-device cumulative disk counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read.
    fn read_disk_counters(&self) -> HeadroomResult<HashMap<String, IoCounters>>;

    /// Read everything at once.
    ///
    /// # Errors
    ///
    /// Returns an error if any source cannot be read.
    fn snapshot(&self) -> HeadroomResult<SystemSnapshot> {
        Ok(SystemSnapshot {
            memory: self.read_memory()?,
            cpu: self.read_cpu_times()?,
            disks: self.read_disk_counters()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_time_aggregates() {
        let times = CpuTimes {
            user: 50,
            nice: 5,
            system: 20,
            idle: 100,
            iowait: 10,
            irq: 3,
            softirq: 2,
            steal: 10,
        };
        assert_eq!(times.total(), 200);
        assert_eq!(times.idle_capacity(), 110);
        assert_eq!(times.busy(), 90);
    }
}
