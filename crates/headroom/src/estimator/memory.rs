//! Memory ceiling estimator.

use super::MIN_MEMORY_CEILING;

/// Compute the next `memory.max`.
///
/// Pure proportional control on live figures: after the new ceiling takes
/// effect, machine-wide available memory should settle at `total * margin`.
/// Returns `None` when `total` is zero.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn estimate_memory_ceiling(current: u64, available: u64, total: u64, margin: f64) -> Option<u64> {
    if total == 0 {
        return None;
    }

    // Whole bytes, so a machine sitting exactly at the margin is a fixed point.
    let margin = (total as f64 * margin).round() as i128;
    let available = i128::from(available);
    let current = i128::from(current);

    let ceiling = if available < margin {
        current - (margin - available)
    } else {
        current + (available - margin)
    };

    let ceiling = ceiling.clamp(i128::from(MIN_MEMORY_CEILING), i128::from(u64::MAX));
    u64::try_from(ceiling).ok()
}
