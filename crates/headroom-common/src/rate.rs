//! Throughput quantities reported by disk benchmark tools.
//!
//! Tools such as `hdparm` and `dd` end their report with a figure like
//! `98.40 MB/sec` or `1.4 GB/s`. Units are treated as powers of 1024:
//! - "kB" -> value * 1024 bytes/second
//! - "MB" -> value * 1024^2 bytes/second
//! - "GB" -> value * 1024^3 bytes/second
//! - "TB" -> value * 1024^4 bytes/second
//!
//! Any other unit is read as plain bytes/second.

use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HeadroomError, HeadroomResult};

const KI: u64 = 1024;
const MI: u64 = 1024 * 1024;
const GI: u64 = 1024 * 1024 * 1024;
const TI: u64 = 1024 * 1024 * 1024 * 1024;

/// A throughput in bytes per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ByteRate(u64);

impl ByteRate {
    /// No throughput.
    pub const ZERO: Self = Self(0);

    /// Create a rate from bytes per second.
    #[must_use]
    pub const fn bytes_per_second(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Create a rate from mebibytes per second.
    #[must_use]
    pub const fn mebibytes_per_second(mib: u64) -> Self {
        Self(mib * MI)
    }

    /// Get the raw bytes per second.
    #[must_use]
    pub const fn as_bytes_per_second(&self) -> u64 {
        self.0
    }

    /// Whether this rate is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Parse a `<value> <unit>[/<time>]` pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a non-negative number.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn parse_pair(value: &str, unit: &str) -> HeadroomResult<Self> {
        let invalid = || HeadroomError::InvalidRate {
            value: format!("{value} {unit}"),
        };

        let value: f64 = value.trim().parse().map_err(|_| invalid())?;
        if !value.is_finite() || value < 0.0 {
            return Err(invalid());
        }

        // "MB/sec" -> "MB"
        let unit = unit.split('/').next().unwrap_or_default();
        let multiplier = match unit {
            "kB" | "KB" | "KiB" => KI,
            "MB" | "MiB" => MI,
            "GB" | "GiB" => GI,
            "TB" | "TiB" => TI,
            _ => 1,
        };

        Ok(Self((value * multiplier as f64) as u64))
    }

    /// Parse the trailing throughput figure of a tool's textual report.
    ///
    /// Only the last two whitespace-separated words are considered.
    ///
    /// # Errors
    ///
    /// Returns an error if the output has fewer than two words or the
    /// value is not numeric.
    pub fn parse_tool_output(output: &str) -> HeadroomResult<Self> {
        let words: Vec<&str> = output.split_whitespace().collect();
        match words.as_slice() {
            [.., value, unit] => Self::parse_pair(value, unit),
            _ => Err(HeadroomError::InvalidRate {
                value: output.trim().to_string(),
            }),
        }
    }
}

impl Add for ByteRate {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl std::iter::Sum for ByteRate {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for ByteRate {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        if bytes >= TI {
            write!(f, "{:.1}TiB/s", bytes as f64 / TI as f64)
        } else if bytes >= GI {
            write!(f, "{:.1}GiB/s", bytes as f64 / GI as f64)
        } else if bytes >= MI {
            write!(f, "{:.1}MiB/s", bytes as f64 / MI as f64)
        } else if bytes >= KI {
            write!(f, "{:.1}KiB/s", bytes as f64 / KI as f64)
        } else {
            write!(f, "{bytes}B/s")
        }
    }
}

impl FromStr for ByteRate {
    type Err = HeadroomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_tool_output(s)
    }
}
