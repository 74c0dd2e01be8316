// src/services/calculations.rs
use log::debug;

/// Minimum number of quarters that must be present before a full-year sum is trusted.
pub const FULL_YEAR_QUORUM: usize = 3;

/// `(value - base) / |base| * 100`, or `None` when an operand is missing or `base` is zero.
fn calculate_relative_change(value: Option<f64>, base: Option<f64>) -> Option<f64> {
    let (value, base) = (value?, base?);
    if base == 0.0 || !value.is_finite() || !base.is_finite() {
        return None;
    }
    Some((value - base) / base.abs() * 100.0)
}

/// Surprise of a reported figure over its consensus estimate, in percent.
pub fn beat_pct(actual: Option<f64>, estimate: Option<f64>) -> Option<f64> {
    calculate_relative_change(actual, estimate)
}

/// Growth of `current` over `prior`, in percent.
pub fn yoy_pct(current: Option<f64>, prior: Option<f64>) -> Option<f64> {
    calculate_relative_change(current, prior)
}

/// Sums the present quarterly values of one year, if at least `FULL_YEAR_QUORUM` are present.
pub fn quorum_sum(quarters: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = quarters.iter().flatten().copied().collect();
    if present.len() < FULL_YEAR_QUORUM {
        debug!(
            "Only {} of {} quarters present, full-year sum withheld",
            present.len(),
            quarters.len()
        );
        return None;
    }
    Some(present.iter().sum())
}
