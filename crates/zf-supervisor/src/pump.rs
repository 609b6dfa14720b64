//! Heat-pump run tracking with a demand-off delay.

use chrono::{DateTime, Utc};
use zf_core::{PumpState, ThermalDirection, elapsed_minutes};

#[derive(Debug, Clone)]
pub struct PumpTracker {
    off_delay_minutes: f64,
    state: PumpState,
    last_demand: Option<DateTime<Utc>>,
}

impl PumpTracker {
    pub fn new(off_delay_minutes: f64) -> Self {
        Self {
            off_delay_minutes: off_delay_minutes.max(0.0),
            state: PumpState::Idle,
            last_demand: None,
        }
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    pub fn set_off_delay(&mut self, minutes: f64) {
        self.off_delay_minutes = minutes.max(0.0);
    }

    /// Advance the tracker.
    ///
    /// `direction` is `None` when the installation is switched off, which
    /// idles the pump at once. Otherwise the last run state is held for the
    /// off delay after the last circuit switched off.
    pub fn update(
        &mut self,
        any_circuit_on: bool,
        direction: Option<ThermalDirection>,
        now: DateTime<Utc>,
    ) -> PumpState {
        self.state = match direction {
            None => {
                self.last_demand = None;
                PumpState::Idle
            }
            Some(direction) if any_circuit_on => {
                self.last_demand = Some(now);
                PumpState::running(direction)
            }
            Some(_) => match self.last_demand {
                Some(at) if elapsed_minutes(now, at) < self.off_delay_minutes => self.state,
                _ => PumpState::Idle,
            },
        };
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn holds_state_through_off_delay() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 5, 7, 0, 0).unwrap();
        let mut pump = PumpTracker::new(5.0);
        assert_eq!(pump.update(true, Some(ThermalDirection::Heat), t0), PumpState::Heat);
        let t1 = t0 + Duration::minutes(4);
        assert_eq!(pump.update(false, Some(ThermalDirection::Heat), t1), PumpState::Heat);
        let t2 = t0 + Duration::minutes(5);
        assert_eq!(pump.update(false, Some(ThermalDirection::Heat), t2), PumpState::Idle);
    }

    #[test]
    fn off_mode_idles_immediately() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 5, 7, 0, 0).unwrap();
        let mut pump = PumpTracker::new(5.0);
        pump.update(true, Some(ThermalDirection::Cool), t0);
        assert_eq!(pump.state(), PumpState::Cool);
        assert_eq!(pump.update(true, None, t0), PumpState::Idle);
    }

    #[test]
    fn never_started_stays_idle() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 5, 7, 0, 0).unwrap();
        let mut pump = PumpTracker::new(5.0);
        assert_eq!(pump.update(false, Some(ThermalDirection::Heat), t0), PumpState::Idle);
    }
}
