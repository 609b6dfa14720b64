//! Runtime flow-curve offset.

use zf_core::ensure_finite;

use crate::error::SupervisorResult;

pub const OFFSET_MIN: f64 = -5.0;
pub const OFFSET_MAX: f64 = 5.0;

/// Configured offset plus an optional runtime override.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowCurveOffset {
    base: f64,
    override_value: Option<f64>,
}

impl FlowCurveOffset {
    pub fn new(base: f64) -> Self {
        Self {
            base,
            override_value: None,
        }
    }

    /// Value in effect: the override when set, else the configured base.
    pub fn get(&self) -> f64 {
        self.override_value.unwrap_or(self.base)
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    pub fn is_overridden(&self) -> bool {
        self.override_value.is_some()
    }

    pub fn set_base(&mut self, base: f64) {
        self.base = base;
    }

    /// Install an override, clamped to `[-5, 5]`. Returns whether the
    /// effective value changed.
    pub fn set(&mut self, value: f64) -> SupervisorResult<bool> {
        let value = ensure_finite(value, "flow curve offset")?.clamp(OFFSET_MIN, OFFSET_MAX);
        let before = self.get();
        self.override_value = Some(value);
        Ok(before != self.get())
    }

    pub fn reset(&mut self) -> bool {
        let before = self.get();
        self.override_value = None;
        before != self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_reset_returns_to_base() {
        let mut offset = FlowCurveOffset::new(1.5);
        assert!(offset.set(-2.0).unwrap());
        assert_eq!(offset.get(), -2.0);
        assert!(offset.is_overridden());
        assert!(offset.reset());
        assert_eq!(offset.get(), 1.5);
        assert!(!offset.reset());
    }

    #[test]
    fn override_is_clamped() {
        let mut offset = FlowCurveOffset::new(0.0);
        offset.set(9.0).unwrap();
        assert_eq!(offset.get(), OFFSET_MAX);
        offset.set(-9.0).unwrap();
        assert_eq!(offset.get(), OFFSET_MIN);
    }

    #[test]
    fn non_finite_is_rejected() {
        let mut offset = FlowCurveOffset::new(0.0);
        assert!(offset.set(f64::NAN).is_err());
        assert!(!offset.is_overridden());
    }

    #[test]
    fn override_equal_to_base_is_not_a_change() {
        let mut offset = FlowCurveOffset::new(1.0);
        assert!(!offset.set(1.0).unwrap());
        assert!(offset.is_overridden());
    }
}
