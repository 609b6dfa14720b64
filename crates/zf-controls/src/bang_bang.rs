//! Bang-bang control with a symmetric hysteresis band.
//!
//! In heating the circuit switches on below `target - h` and off above
//! `target + h`; cooling mirrors both comparisons. Inside the band the
//! previous actuator state is kept, which is the only memory the latch has.

use serde::{Deserialize, Serialize};
use zf_core::ThermalDirection;

use crate::error::{ControlError, ControlResult};

/// Outcome of one bang-bang evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchDecision {
    Activate,
    Deactivate,
    Hold,
}

impl SwitchDecision {
    /// Resolve the decision against the actuator's last known state.
    pub fn resolve(self, was_active: bool) -> bool {
        match self {
            SwitchDecision::Activate => true,
            SwitchDecision::Deactivate => false,
            SwitchDecision::Hold => was_active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BangBang {
    /// Half-width of the dead band in °C.
    pub hysteresis: f64,
}

impl Default for BangBang {
    fn default() -> Self {
        Self { hysteresis: 0.3 }
    }
}

impl BangBang {
    pub fn new(hysteresis: f64) -> ControlResult<Self> {
        if !hysteresis.is_finite() {
            return Err(ControlError::NonFinite {
                what: "hysteresis",
                value: hysteresis,
            });
        }
        if hysteresis < 0.0 {
            return Err(ControlError::InvalidArg {
                what: "hysteresis must be non-negative",
            });
        }
        Ok(Self { hysteresis })
    }

    pub fn decide(&self, current: f64, target: f64, direction: ThermalDirection) -> SwitchDecision {
        let low = target - self.hysteresis;
        let high = target + self.hysteresis;
        let (activate, deactivate) = match direction {
            ThermalDirection::Heat => (current < low, current > high),
            ThermalDirection::Cool => (current > high, current < low),
        };
        if activate {
            SwitchDecision::Activate
        } else if deactivate {
            SwitchDecision::Deactivate
        } else {
            SwitchDecision::Hold
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heating_below_band_activates() {
        let bb = BangBang::new(0.3).unwrap();
        assert_eq!(bb.decide(19.0, 21.0, ThermalDirection::Heat), SwitchDecision::Activate);
        assert_eq!(bb.decide(21.4, 21.0, ThermalDirection::Heat), SwitchDecision::Deactivate);
        assert_eq!(bb.decide(21.0, 21.0, ThermalDirection::Heat), SwitchDecision::Hold);
    }

    #[test]
    fn cooling_inverts_comparisons() {
        let bb = BangBang::new(0.3).unwrap();
        assert_eq!(bb.decide(23.0, 21.0, ThermalDirection::Cool), SwitchDecision::Activate);
        assert_eq!(bb.decide(20.5, 21.0, ThermalDirection::Cool), SwitchDecision::Deactivate);
        assert_eq!(bb.decide(21.2, 21.0, ThermalDirection::Cool), SwitchDecision::Hold);
    }

    #[test]
    fn band_edges_hold() {
        let bb = BangBang::new(0.5).unwrap();
        assert_eq!(bb.decide(20.5, 21.0, ThermalDirection::Heat), SwitchDecision::Hold);
        assert_eq!(bb.decide(21.5, 21.0, ThermalDirection::Heat), SwitchDecision::Hold);
    }

    #[test]
    fn hold_keeps_previous_state() {
        assert!(SwitchDecision::Hold.resolve(true));
        assert!(!SwitchDecision::Hold.resolve(false));
        assert!(SwitchDecision::Activate.resolve(false));
        assert!(!SwitchDecision::Deactivate.resolve(true));
    }

    #[test]
    fn invalid_parameters() {
        assert!(BangBang::new(-0.1).is_err());
        assert!(BangBang::new(f64::NAN).is_err());
    }
}
