//! On-time derivation for duty-cycled circuits.
//!
//! A duty percentage becomes minutes-on within one fixed cycle. The steps
//! run in a fixed order and reordering them changes edge results:
//!
//! 1. `on = cycle * duty / 100`
//! 2. floor snap: on-times shorter than min-on snap to 0 (duty < 5 %) or
//!    to min-on; off-times shorter than min-off snap to full-on (duty > 95 %)
//!    or to min-off
//! 3. anti-short-cycle: an already running circuit whose off-time is still
//!    below min-off stays on for the whole cycle
//! 4. actuator delay is added to any non-zero on-time
//! 5. clamp to the cycle length

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};

/// Below this duty a too-short pulse is dropped instead of stretched.
pub const SNAP_OFF_DUTY: f64 = 5.0;
/// Above this duty a too-short pause is dropped instead of stretched.
pub const SNAP_ON_DUTY: f64 = 95.0;

/// Cycle timing for one PWM zone, all in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PwmTiming {
    pub cycle_minutes: u32,
    pub min_on_minutes: u32,
    pub min_off_minutes: u32,
    pub actuator_delay_minutes: u32,
}

impl Default for PwmTiming {
    fn default() -> Self {
        Self {
            cycle_minutes: 15,
            min_on_minutes: 3,
            min_off_minutes: 3,
            actuator_delay_minutes: 0,
        }
    }
}

impl PwmTiming {
    pub fn new(
        cycle_minutes: u32,
        min_on_minutes: u32,
        min_off_minutes: u32,
        actuator_delay_minutes: u32,
    ) -> ControlResult<Self> {
        if cycle_minutes == 0 {
            return Err(ControlError::InvalidArg {
                what: "cycle length must be at least one minute",
            });
        }
        if min_on_minutes >= cycle_minutes {
            return Err(ControlError::InvalidArg {
                what: "min on-time must be shorter than the cycle",
            });
        }
        if min_off_minutes >= cycle_minutes {
            return Err(ControlError::InvalidArg {
                what: "min off-time must be shorter than the cycle",
            });
        }
        Ok(Self {
            cycle_minutes,
            min_on_minutes,
            min_off_minutes,
            actuator_delay_minutes,
        })
    }

    /// Minutes the circuit should be on in the coming cycle.
    pub fn on_time_minutes(&self, duty: f64, was_active: bool) -> f64 {
        let cycle = f64::from(self.cycle_minutes);
        let min_on = f64::from(self.min_on_minutes);
        let min_off = f64::from(self.min_off_minutes);

        let mut on = cycle * duty / 100.0;
        let mut off = cycle - on;

        if on > 0.0 && on < min_on {
            on = if duty < SNAP_OFF_DUTY { 0.0 } else { min_on };
            off = cycle - on;
        }

        if off > 0.0 && off < min_off {
            off = if duty > SNAP_ON_DUTY { 0.0 } else { min_off };
            on = cycle - off;
        }

        if was_active && off > 0.0 && off < min_off {
            on = cycle;
        }

        on = on.clamp(0.0, cycle);
        if on > 0.0 {
            on = (on + f64::from(self.actuator_delay_minutes)).min(cycle);
        }
        on
    }
}

/// Whether the circuit is inside the on-slice of the current cycle.
pub fn should_be_on(
    now: DateTime<Utc>,
    cycle_start: Option<DateTime<Utc>>,
    on_minutes: f64,
) -> bool {
    match cycle_start {
        Some(start) => now < start + zf_core::minutes(on_minutes),
        None => false,
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn on_time_is_idempotent_and_bounded(
            duty in 0.0_f64..=100.0,
            was_active in any::<bool>(),
            cycle in 5_u32..60,
            delay in 0_u32..5,
        ) {
            let t = PwmTiming::new(cycle, 2, 2, delay).unwrap();
            let first = t.on_time_minutes(duty, was_active);
            let second = t.on_time_minutes(duty, was_active);
            prop_assert_eq!(first.to_bits(), second.to_bits());
            prop_assert!(first >= 0.0 && first <= f64::from(cycle));
        }
    }
}
