//! One-time disk throughput benchmark.
//!
//! Each physical disk's ceiling is the sum of the read and write rates
//! measured on the disk itself and every node below it. Partitions share
//! the disk's bandwidth, so the governor limits against the whole subtree.

mod probe;

use std::collections::HashMap;
use std::ops::Add;

use headroom_common::ByteRate;
use serde::{Deserialize, Serialize};

use crate::device::{DeviceCatalog, DeviceDescriptor, IoDirection};

pub use probe::ToolProbe;

/// Maximum throughput of a disk subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceBenchmark {
    /// Sequential read rate.
    pub read: ByteRate,
    /// Sequential write rate.
    pub write: ByteRate,
}

impl DeviceBenchmark {
    /// Rate for one direction.
    #[must_use]
    pub const fn get(&self, direction: IoDirection) -> ByteRate {
        match direction {
            IoDirection::Read => self.read,
            IoDirection::Write => self.write,
        }
    }
}

impl Add for DeviceBenchmark {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            read: self.read + rhs.read,
            write: self.write + rhs.write,
        }
    }
}

impl std::iter::Sum for DeviceBenchmark {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Measures a single block device node.
///
/// Implementations are best-effort: `None` means the measurement was not
/// possible and counts as zero.
pub trait ThroughputProbe: Send + Sync {
    /// Sequential read rate of `device`.
    fn read_throughput(&self, device: &DeviceDescriptor) -> Option<ByteRate>;

    /// Sequential write rate of `device`.
    fn write_throughput(&self, device: &DeviceDescriptor) -> Option<ByteRate>;
}

/// Measure `device` and everything below it, children first.
pub fn benchmark_subtree<P: ThroughputProbe + ?Sized>(
    device: &DeviceDescriptor,
    probe: &P,
) -> DeviceBenchmark {
    let children: DeviceBenchmark = device
        .children
        .iter()
        .map(|child| benchmark_subtree(child, probe))
        .sum();

    let own = DeviceBenchmark {
        read: probe.read_throughput(device).unwrap_or(ByteRate::ZERO),
        write: probe.write_throughput(device).unwrap_or(ByteRate::ZERO),
    };

    tracing::debug!(
        device = %device.kernel_name,
        read = %own.read,
        write = %own.write,
        "Measured device node"
    );

    children + own
}

/// Benchmark every physical disk in `catalog`, keyed by kernel name.
pub fn benchmark_all<P: ThroughputProbe + ?Sized>(
    catalog: &DeviceCatalog,
    probe: &P,
) -> HashMap<String, DeviceBenchmark> {
    catalog
        .disks()
        .map(|disk| {
            let result = benchmark_subtree(disk, probe);
            tracing::info!(
                device = %disk.kernel_name,
                read = %result.read,
                write = %result.write,
                "Benchmarked disk"
            );
            (disk.kernel_name.clone(), result)
        })
        .collect()
}
