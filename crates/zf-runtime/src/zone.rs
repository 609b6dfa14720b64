//! Per-zone controller state.
//!
//! A [`ZoneController`] owns one zone's target, manual mode and duty-cycle
//! state, and makes the on/off decision for its circuits. It performs no
//! I/O: the installation reads sensors, calls [`ZoneController::decide`],
//! commands the circuits and reports the outcome back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zf_controls::{BangBang, CycleClock, DutyController, PiState, PwmTiming, should_be_on};
use zf_core::{
    ControlMode, HvacAction, ManualMode, PointId, ThermalDirection, ZoneId, ZoneResponse,
    ensure_finite,
};
use zf_supervisor::ZoneDemand;

use crate::error::RuntimeResult;
use crate::latch::EvalLatch;

pub const TARGET_MIN: f64 = 5.0;
pub const TARGET_MAX: f64 = 30.0;
pub const DEFAULT_TARGET: f64 = 20.0;
/// Setpoint moves larger than this start a fresh PWM epoch.
pub const TARGET_RESET_JUMP: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoneControl {
    BangBang,
    Pwm {
        pi: DutyController,
        timing: PwmTiming,
    },
}

/// Immutable zone configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneConfig {
    pub id: ZoneId,
    /// Configured zone name.
    pub name: String,
    /// Raw circuit point names; namespaces are checked per command.
    pub circuits: Vec<String>,
    pub temp_sensor: Option<PointId>,
    pub bang_bang: BangBang,
    pub control: ZoneControl,
    pub response: ZoneResponse,
    pub flow_weight: f64,
    pub solar_weight: f64,
}

impl ZoneConfig {
    pub fn control_mode(&self) -> ControlMode {
        match self.control {
            ZoneControl::BangBang => ControlMode::BangBang,
            ZoneControl::Pwm { .. } => ControlMode::Pwm,
        }
    }
}

/// Duty-cycle state of a PWM zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PwmState {
    pub cycle_start: Option<DateTime<Utc>>,
    pub on_minutes: f64,
    pub pi: PiState,
    pub duty: f64,
    pub direction: Option<ThermalDirection>,
}

/// What survives a restart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersistedZoneState {
    pub target: f64,
    pub manual_mode: ManualMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDiagnostics {
    pub id: ZoneId,
    pub name: String,
    pub target: f64,
    pub current: Option<f64>,
    pub manual_mode: ManualMode,
    pub action: HvacAction,
    pub active: bool,
    pub control_mode: ControlMode,
    pub pwm_duty: Option<f64>,
    pub pwm_on_minutes: Option<f64>,
    pub pwm_cycle_start: Option<DateTime<Utc>>,
    pub pwm_pool_index: Option<usize>,
    pub pwm_pool_size: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ZoneController {
    config: ZoneConfig,
    target: f64,
    manual_mode: ManualMode,
    current: Option<f64>,
    active: bool,
    action: HvacAction,
    pwm: PwmState,
    clock: Option<CycleClock>,
    pub(crate) latch: EvalLatch,
}

impl ZoneController {
    pub fn new(config: ZoneConfig) -> Self {
        Self {
            config,
            target: DEFAULT_TARGET,
            manual_mode: ManualMode::Auto,
            current: None,
            active: false,
            action: HvacAction::Off,
            pwm: PwmState::default(),
            clock: None,
            latch: EvalLatch::default(),
        }
    }

    pub fn id(&self) -> &ZoneId {
        &self.config.id
    }

    pub fn config(&self) -> &ZoneConfig {
        &self.config
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn manual_mode(&self) -> ManualMode {
        self.manual_mode
    }

    pub fn current(&self) -> Option<f64> {
        self.current
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn action(&self) -> HvacAction {
        self.action
    }

    pub fn pwm_state(&self) -> &PwmState {
        &self.pwm
    }

    /// Swap in a new configuration, keeping target and manual mode.
    pub fn reconfigure(&mut self, config: ZoneConfig) {
        if config.control != self.config.control {
            self.reset_pwm();
        }
        if config.control_mode() == ControlMode::BangBang {
            self.clock = None;
        }
        self.config = config;
    }

    /// Place this zone in the shared PWM pool. Ignored for bang-bang zones.
    pub fn set_pool_position(&mut self, index: usize, count: usize) {
        if let ZoneControl::Pwm { timing, .. } = self.config.control {
            self.clock = Some(CycleClock::new(timing.cycle_minutes, index, count));
        }
    }

    /// Set the target, clamped to `[5, 30]`. Returns the stored value.
    pub fn set_target(&mut self, value: f64) -> RuntimeResult<f64> {
        let value = ensure_finite(value, "target temperature")?.clamp(TARGET_MIN, TARGET_MAX);
        if (value - self.target).abs() > TARGET_RESET_JUMP {
            tracing::debug!(zone = %self.config.id, from = self.target, to = value, "large setpoint jump, resetting PWM state");
            self.reset_pwm();
        }
        self.target = value;
        Ok(value)
    }

    pub fn set_manual_mode(&mut self, mode: ManualMode) {
        if mode == ManualMode::Off {
            self.reset_pwm();
        }
        self.manual_mode = mode;
    }

    pub fn reset_pwm(&mut self) {
        self.pwm = PwmState::default();
    }

    pub fn persisted(&self) -> PersistedZoneState {
        PersistedZoneState {
            target: self.target,
            manual_mode: self.manual_mode,
        }
    }

    pub fn restore(&mut self, state: PersistedZoneState) -> RuntimeResult<()> {
        self.set_target(state.target)?;
        self.manual_mode = state.manual_mode;
        Ok(())
    }

    /// Duty reported to the supervisor: 100/0 for bang-bang, PI output for PWM.
    pub fn duty_cycle(&self, active: bool) -> f64 {
        match self.config.control {
            ZoneControl::BangBang => {
                if active {
                    100.0
                } else {
                    0.0
                }
            }
            ZoneControl::Pwm { .. } => self.pwm.duty,
        }
    }

    pub fn demand(&self, current: f64, active: bool) -> ZoneDemand {
        ZoneDemand {
            target: self.target,
            current,
            active,
            duty_cycle: self.duty_cycle(active),
            response: self.config.response,
            flow_weight: self.config.flow_weight,
            solar_weight: self.config.solar_weight,
        }
    }

    /// Decide whether the circuits should be on.
    ///
    /// PWM zones recompute duty and on-time only when a new aligned cycle
    /// starts (or after a reset); inside a cycle the stored on-time holds.
    pub fn decide(
        &mut self,
        current: f64,
        direction: ThermalDirection,
        was_active: bool,
        now: DateTime<Utc>,
    ) -> bool {
        match self.config.control {
            ZoneControl::BangBang => {
                let decision = self.config.bang_bang.decide(current, self.target, direction);
                tracing::debug!(zone = %self.config.id, ?decision, current, target = self.target, "bang-bang decision");
                decision.resolve(was_active)
            }
            ZoneControl::Pwm { pi, timing } => {
                if self.pwm.direction != Some(direction) {
                    self.reset_pwm();
                    self.pwm.direction = Some(direction);
                }
                let clock = self
                    .clock
                    .unwrap_or_else(|| CycleClock::new(timing.cycle_minutes, 0, 1));
                if let Some(start) = clock.should_start_cycle(now, self.pwm.cycle_start) {
                    let output = pi.update(&self.pwm.pi, current, self.target, direction, now);
                    self.pwm.pi = output.state;
                    self.pwm.duty = output.duty;
                    self.pwm.on_minutes = timing.on_time_minutes(output.duty, was_active);
                    self.pwm.cycle_start = Some(start);
                    tracing::debug!(
                        zone = %self.config.id,
                        duty = output.duty,
                        on_minutes = self.pwm.on_minutes,
                        cycle_start = %start,
                        "new PWM cycle"
                    );
                }
                should_be_on(now, self.pwm.cycle_start, self.pwm.on_minutes)
            }
        }
    }

    /// Store the outcome of an evaluation.
    pub fn record(&mut self, current: Option<f64>, active: bool, action: HvacAction) {
        self.current = current;
        self.active = active;
        self.action = action;
    }

    pub fn diagnostics(&self) -> ZoneDiagnostics {
        let pwm = matches!(self.config.control, ZoneControl::Pwm { .. });
        ZoneDiagnostics {
            id: self.config.id.clone(),
            name: self.config.name.clone(),
            target: self.target,
            current: self.current,
            manual_mode: self.manual_mode,
            action: self.action,
            active: self.active,
            control_mode: self.config.control_mode(),
            pwm_duty: pwm.then_some(self.pwm.duty),
            pwm_on_minutes: pwm.then_some(self.pwm.on_minutes),
            pwm_cycle_start: self.pwm.cycle_start,
            pwm_pool_index: self.clock.map(|c| c.index),
            pwm_pool_size: self.clock.map(|c| c.count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn config(control: ZoneControl) -> ZoneConfig {
        ZoneConfig {
            id: ZoneId::from_name("living"),
            name: "living".to_string(),
            circuits: vec!["switch.living".to_string()],
            temp_sensor: Some(PointId::parse("sensor.living").unwrap()),
            bang_bang: BangBang::new(0.3).unwrap(),
            control,
            response: ZoneResponse::Slow,
            flow_weight: 1.0,
            solar_weight: 1.0,
        }
    }

    fn pwm() -> ZoneControl {
        ZoneControl::Pwm {
            pi: DutyController::new(30.0, 2.0).unwrap(),
            timing: PwmTiming::new(15, 3, 3, 0).unwrap(),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 20, 6, 0, 0).unwrap()
    }

    #[test]
    fn target_is_clamped() {
        let mut zone = ZoneController::new(config(ZoneControl::BangBang));
        assert_eq!(zone.set_target(35.0).unwrap(), 30.0);
        assert_eq!(zone.set_target(2.0).unwrap(), 5.0);
        assert!(zone.set_target(f64::NAN).is_err());
        assert_eq!(zone.target(), 5.0);
    }

    #[test]
    fn bang_bang_heats_below_band() {
        let mut zone = ZoneController::new(config(ZoneControl::BangBang));
        zone.set_target(21.0).unwrap();
        assert!(zone.decide(19.0, ThermalDirection::Heat, false, t0()));
        assert!(zone.decide(21.0, ThermalDirection::Heat, true, t0()));
        assert!(!zone.decide(21.4, ThermalDirection::Heat, true, t0()));
        assert_eq!(zone.duty_cycle(true), 100.0);
        assert_eq!(zone.duty_cycle(false), 0.0);
    }

    #[test]
    fn pwm_recomputes_only_on_new_cycle() {
        let mut zone = ZoneController::new(config(pwm()));
        zone.set_target(21.0).unwrap();
        // error 1 °C: 30 + 2 * 1 = 32 % -> 4.8 min on
        assert!(zone.decide(20.0, ThermalDirection::Heat, false, t0()));
        let first = *zone.pwm_state();
        assert!((first.duty - 32.0).abs() < 1e-9);
        assert_eq!(first.cycle_start, Some(t0()));

        // Mid-cycle: colder reading does not change the on-time.
        let later = t0() + Duration::minutes(6);
        assert!(!zone.decide(15.0, ThermalDirection::Heat, true, later));
        assert_eq!(zone.pwm_state().duty, first.duty);

        // Next cycle recomputes.
        let next = t0() + Duration::minutes(15);
        assert!(zone.decide(15.0, ThermalDirection::Heat, false, next));
        assert_eq!(zone.pwm_state().duty, 100.0);
        assert_eq!(zone.pwm_state().cycle_start, Some(next));
    }

    #[test]
    fn large_target_jump_resets_pwm() {
        let mut zone = ZoneController::new(config(pwm()));
        zone.set_target(21.0).unwrap();
        zone.decide(20.0, ThermalDirection::Heat, false, t0());
        assert!(zone.pwm_state().cycle_start.is_some());

        zone.set_target(22.5).unwrap();
        assert!(zone.pwm_state().cycle_start.is_some());
        zone.set_target(25.0).unwrap();
        assert_eq!(*zone.pwm_state(), PwmState::default());
    }

    #[test]
    fn manual_off_resets_pwm() {
        let mut zone = ZoneController::new(config(pwm()));
        zone.decide(18.0, ThermalDirection::Heat, false, t0());
        zone.set_manual_mode(ManualMode::Off);
        assert_eq!(*zone.pwm_state(), PwmState::default());
        assert_eq!(zone.manual_mode(), ManualMode::Off);
    }

    #[test]
    fn direction_change_starts_new_pwm_epoch() {
        let mut zone = ZoneController::new(config(pwm()));
        zone.set_target(21.0).unwrap();
        zone.decide(20.0, ThermalDirection::Heat, false, t0());
        let later = t0() + Duration::minutes(2);
        // Cooling with the room below target: zero duty immediately.
        assert!(!zone.decide(20.0, ThermalDirection::Cool, false, later));
        assert_eq!(zone.pwm_state().duty, 0.0);
        assert_eq!(zone.pwm_state().direction, Some(ThermalDirection::Cool));
    }

    #[test]
    fn pool_position_staggers_cycle_start() {
        let mut zone = ZoneController::new(config(pwm()));
        zone.set_pool_position(1, 3);
        zone.set_target(21.0).unwrap();
        zone.decide(20.0, ThermalDirection::Heat, false, t0() + Duration::minutes(6));
        assert_eq!(zone.pwm_state().cycle_start, Some(t0() + Duration::minutes(5)));
        let diag = zone.diagnostics();
        assert_eq!(diag.pwm_pool_index, Some(1));
        assert_eq!(diag.pwm_pool_size, Some(3));
    }

    #[test]
    fn persisted_roundtrip() {
        let mut zone = ZoneController::new(config(ZoneControl::BangBang));
        zone.set_target(22.5).unwrap();
        zone.set_manual_mode(ManualMode::Off);
        let saved = zone.persisted();

        let mut fresh = ZoneController::new(config(ZoneControl::BangBang));
        fresh.restore(saved).unwrap();
        assert_eq!(fresh.target(), 22.5);
        assert_eq!(fresh.manual_mode(), ManualMode::Off);
    }
}
