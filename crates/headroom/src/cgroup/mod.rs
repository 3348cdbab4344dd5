//! Cgroup v2 management.
//!
//! This module provides the governed process's control group: creating it,
//! reading its usage counters and writing the limits computed each tick.

mod manager;
mod stats;

use std::collections::HashMap;
use std::path::Path;

use headroom_common::HeadroomResult;
use serde::{Deserialize, Serialize};

use crate::device::{DeviceNumber, IoCounters, IoDirection};

pub use manager::CgroupManager;

/// Controllers the governor needs delegated to its scope.
pub const CONTROLLERS: [&str; 3] = ["memory", "cpu", "io"];

/// Cgroup version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupVersion {
    /// Cgroups v1 (legacy).
    V1,
    /// Cgroups v2 (unified).
    V2,
    /// Hybrid mode (v1 + v2).
    Hybrid,
}

impl CgroupVersion {
    /// Detect the cgroup version mounted at `root`.
    pub fn detect(root: &Path) -> Self {
        let unified = root.join("cgroup.controllers").exists();
        let legacy = root.join("cpu").is_dir() || root.join("memory").is_dir();

        match (unified, legacy) {
            (true, false) => Self::V2,
            (true, true) => Self::Hybrid,
            _ => Self::V1,
        }
    }
}

/// A point-in-time view of the governed group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CgroupSnapshot {
    /// `memory.max`, or `None` when the group is unbounded.
    pub memory_ceiling: Option<u64>,
    /// `memory.current`.
    pub memory_current: u64,
    /// Cumulative CPU time consumed, in microseconds.
    pub cpu_usage_usec: u64,
    /// Cumulative I/O per device.
    pub io: HashMap<DeviceNumber, IoCounters>,
}

/// `cpu.max` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuMax {
    /// Runtime allowed per period, in microseconds.
    pub quota_usec: u64,
    /// Period length, in microseconds.
    pub period_usec: u64,
}

/// One `io.max` byte-rate entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoLimit {
    /// Target device.
    pub device: DeviceNumber,
    /// Limited direction.
    pub direction: IoDirection,
    /// Allowed bytes per second (always > 0).
    pub bytes_per_second: u64,
}

/// Limits produced by one governor tick.
///
/// `None` / an absent I/O entry means the resource was not recomputed this
/// tick and whatever limit is in place is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// New `memory.max`.
    pub memory_max: Option<u64>,
    /// New `cpu.max`.
    pub cpu: Option<CpuMax>,
    /// New per-device byte-rate caps.
    pub io: Vec<IoLimit>,
}

impl ResourceLimits {
    /// Whether nothing would be written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memory_max.is_none() && self.cpu.is_none() && self.io.is_empty()
    }
}

/// The group the governed process lives in.
pub trait ResourceController: Send + Sync {
    /// Read current usage counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the counters cannot be read or parsed.
    fn read_stats(&self) -> HeadroomResult<CgroupSnapshot>;

    /// Write new limits.
    ///
    /// # Errors
    ///
    /// Returns an error if any limit cannot be written.
    fn apply_limits(&self, limits: &ResourceLimits) -> HeadroomResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_unified_hierarchy() {
        let temp = tempfile::tempdir().unwrap();
        assert_eq!(CgroupVersion::detect(temp.path()), CgroupVersion::V1);

        std::fs::write(temp.path().join("cgroup.controllers"), "cpu io memory").unwrap();
        assert_eq!(CgroupVersion::detect(temp.path()), CgroupVersion::V2);

        std::fs::create_dir(temp.path().join("cpu")).unwrap();
        assert_eq!(CgroupVersion::detect(temp.path()), CgroupVersion::Hybrid);
    }

    #[test]
    fn empty_limits() {
        assert!(ResourceLimits::default().is_empty());
        let limits = ResourceLimits {
            memory_max: Some(1),
            ..Default::default()
        };
        assert!(!limits.is_empty());
    }
}
