//! Block devices.
//!
//! This module identifies block devices by their kernel `MAJ:MIN` pair,
//! which is the only key the cgroup I/O controller understands, and
//! builds the catalog of physical disks from `lsblk`.

mod catalog;

use std::fmt;
use std::str::FromStr;

use headroom_common::{HeadroomError, HeadroomResult};
use serde::{Deserialize, Serialize};

pub use catalog::{DeviceCatalog, DeviceDescriptor};

/// A block device number (`MAJ:MIN`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceNumber {
    /// Major number (driver).
    pub major: u32,
    /// Minor number (instance).
    pub minor: u32,
}

impl DeviceNumber {
    /// Create a device number.
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for DeviceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

impl FromStr for DeviceNumber {
    type Err = HeadroomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || HeadroomError::MalformedStats {
            source_file: "device number".to_string(),
            message: format!("expected MAJ:MIN, got {s:?}"),
        };

        let (major, minor) = s.trim().split_once(':').ok_or_else(malformed)?;
        Ok(Self {
            major: major.parse().map_err(|_| malformed())?,
            minor: minor.parse().map_err(|_| malformed())?,
        })
    }
}

/// Direction of block I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoDirection {
    /// Reads from the device.
    Read,
    /// Writes to the device.
    Write,
}

impl IoDirection {
    /// Both directions, reads first.
    pub const ALL: [Self; 2] = [Self::Read, Self::Write];

    /// Key of the byte-rate limit in `io.max`.
    #[must_use]
    pub const fn bps_key(self) -> &'static str {
        match self {
            Self::Read => "rbps",
            Self::Write => "wbps",
        }
    }
}

impl fmt::Display for IoDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// Cumulative bytes transferred by a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoCounters {
    /// Bytes read.
    pub read_bytes: u64,
    /// Bytes written.
    pub write_bytes: u64,
}

impl IoCounters {
    /// Create counters.
    #[must_use]
    pub const fn new(read_bytes: u64, write_bytes: u64) -> Self {
        Self {
            read_bytes,
            write_bytes,
        }
    }

    /// Counter for one direction.
    #[must_use]
    pub const fn get(&self, direction: IoDirection) -> u64 {
        match direction {
            IoDirection::Read => self.read_bytes,
            IoDirection::Write => self.write_bytes,
        }
    }
}

/// Parse a device number, mapping failures into the given context.
pub(crate) fn parse_device_number(s: &str, source_file: &str) -> HeadroomResult<DeviceNumber> {
    s.parse().map_err(|_| HeadroomError::MalformedStats {
        source_file: source_file.to_string(),
        message: format!("invalid device number {s:?}"),
    })
}
