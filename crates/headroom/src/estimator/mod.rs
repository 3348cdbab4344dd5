//! Per-resource limit estimators.
//!
//! Every estimator applies the same margin control law: given what the
//! child used over the last tick and how much of the machine's capacity sat
//! unused, pick a limit that leaves exactly `margin` of capacity free.
//! Below the margin the child is shrunk by the shortfall; above it the
//! child may grow into the surplus.

mod cpu;
mod io;
mod memory;

pub use cpu::{CpuEstimator, CpuSample, cpu_quota};
pub use io::IoEstimator;
pub use memory::estimate_memory_ceiling;

/// Fraction of capacity kept free for other workloads.
pub const DEFAULT_MARGIN: f64 = 0.10;

/// CPU bandwidth period, in microseconds.
pub const CPU_PERIOD_USEC: u64 = 100_000;

/// Smallest `cpu.max` quota the kernel accepts, in microseconds.
pub const MIN_CPU_QUOTA_USEC: u64 = 1_000;

/// Smallest memory ceiling ever commanded, in bytes.
pub const MIN_MEMORY_CEILING: u64 = 1024 * 1024;

/// Target usage for the next tick.
///
/// `usage - (margin - available)` when `available < margin`,
/// `usage + (available - margin)` otherwise. The result may be negative;
/// callers clamp.
#[must_use]
pub fn control_law(usage: f64, available: f64, margin: f64) -> f64 {
    if available < margin {
        usage - (margin - available)
    } else {
        usage + (available - margin)
    }
}
