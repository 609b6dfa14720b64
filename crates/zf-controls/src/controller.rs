//! PI duty-cycle controller.
//!
//! Converts a temperature error into a duty percentage in `[0, 100]`.
//!
//! - Error is signed by thermal direction (heating: `target - current`)
//! - Integral accumulates `error * dt` in °C·min
//! - Anti-windup: the integral is clamped to `±100 / |ki|`, so the integral
//!   term on its own never exceeds the 100 % output ceiling
//! - Output clamping to `[0, 100]`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zf_core::{ThermalDirection, elapsed_minutes};

use crate::error::{ControlError, ControlResult};

/// Lower bound for the integration step, in minutes. Also the cold-start step.
pub const MIN_STEP_MINUTES: f64 = 1.0;

/// Maximum duty percentage.
pub const DUTY_MAX: f64 = 100.0;

/// PI duty controller configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DutyController {
    /// Proportional gain (% per °C).
    pub kp: f64,
    /// Integral gain (% per °C·min).
    pub ki: f64,
}

impl DutyController {
    /// Create a new PI duty controller.
    ///
    /// # Arguments
    ///
    /// * `kp` - Proportional gain
    /// * `ki` - Integral gain; zero disables integral action
    pub fn new(kp: f64, ki: f64) -> ControlResult<Self> {
        if !kp.is_finite() {
            return Err(ControlError::NonFinite { what: "kp", value: kp });
        }
        if !ki.is_finite() {
            return Err(ControlError::NonFinite { what: "ki", value: ki });
        }
        if kp < 0.0 {
            return Err(ControlError::InvalidArg {
                what: "kp must be non-negative",
            });
        }
        Ok(Self { kp, ki })
    }

    /// Bound applied to the integral accumulator, if any.
    pub fn integral_limit(&self) -> Option<f64> {
        if self.ki != 0.0 {
            Some(DUTY_MAX / self.ki.abs())
        } else {
            None
        }
    }

    /// Compute the duty percentage for this evaluation.
    ///
    /// # Arguments
    ///
    /// * `state` - Integral and last evaluation time
    /// * `current` - Measured zone temperature
    /// * `target` - Zone setpoint
    /// * `direction` - Heat or cool; flips the error sign
    /// * `now` - Evaluation timestamp
    pub fn update(
        &self,
        state: &PiState,
        current: f64,
        target: f64,
        direction: ThermalDirection,
        now: DateTime<Utc>,
    ) -> DutyOutput {
        let error = match direction {
            ThermalDirection::Heat => target - current,
            ThermalDirection::Cool => current - target,
        };

        let dt_minutes = match state.last_control {
            Some(last) => elapsed_minutes(now, last).max(MIN_STEP_MINUTES),
            None => MIN_STEP_MINUTES,
        };

        let mut integral = state.integral + error * dt_minutes;
        if let Some(limit) = self.integral_limit() {
            integral = integral.clamp(-limit, limit);
        }

        let p_term = self.kp * error;
        let i_term = self.ki * integral;
        let duty = (p_term + i_term).clamp(0.0, DUTY_MAX);

        DutyOutput {
            duty,
            state: PiState {
                integral,
                last_control: Some(now),
            },
        }
    }
}

/// PI controller state carried between evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PiState {
    /// Integral accumulator (°C·min).
    pub integral: f64,
    /// Timestamp of the last evaluation.
    pub last_control: Option<DateTime<Utc>>,
}

/// Result of one PI evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DutyOutput {
    /// Duty percentage in `[0, 100]`.
    pub duty: f64,
    /// Updated controller state.
    pub state: PiState,
}
