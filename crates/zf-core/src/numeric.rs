use crate::CoreError;

/// Floating point type used throughout system
pub type Real = f64;

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, CoreError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Round to a fixed number of decimals (used for published read-outs).
pub fn round_to(v: Real, decimals: i32) -> Real {
    let scale = 10_f64.powi(decimals);
    (v * scale).round() / scale
}

/// Weighted mean over `(value, weight)` pairs, ignoring non-positive weights.
///
/// Returns 0.0 when no pair carries weight.
pub fn weighted_average<I>(values: I) -> Real
where
    I: IntoIterator<Item = (Real, Real)>,
{
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for (value, weight) in values {
        if weight <= 0.0 {
            continue;
        }
        weighted_sum += value * weight;
        total_weight += weight;
    }
    if total_weight <= 0.0 {
        0.0
    } else {
        weighted_sum / total_weight
    }
}

/// Normalise a pair of non-negative weights so they sum to one.
///
/// Negative inputs count as zero; when both are zero the first weight wins.
pub fn normalize_pair(a: Real, b: Real) -> (Real, Real) {
    let a = a.max(0.0);
    let b = b.max(0.0);
    let total = a + b;
    if total <= 0.0 {
        (1.0, 0.0)
    } else {
        (a / total, b / total)
    }
}
