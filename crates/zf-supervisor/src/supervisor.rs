//! The shared heat-source supervisor.
//!
//! Owns the demand book and every global decision derived from it:
//! operation mode, auto direction, flow setpoint, write suppression and
//! pump run state. Zones push snapshots in and read decisions back out;
//! they never see each other's readings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zf_core::{
    FlowMode, OperationMode, PointId, PumpState, ThermalDirection, ZoneId, ensure_finite, round_to,
};

use crate::adaptive::{AdaptiveSupervisor, AdaptiveTuning, FlowBreakdown};
use crate::curve::CurveSettings;
use crate::demand::{DemandBook, ZoneDemand};
use crate::direction::AutoDirection;
use crate::dispatch::{FlowDispatcher, WritePolicy};
use crate::error::{SupervisorError, SupervisorResult};
use crate::observer::{ObserverHandle, ObserverRegistry, SupervisorObserver};
use crate::offset::FlowCurveOffset;
use crate::pump::PumpTracker;

/// Where the operation mode comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModeSource {
    /// Selectable through [`Supervisor::set_operation_mode`].
    #[default]
    Internal,
    /// Mirrored from an external heat-pump mode sensor.
    External(PointId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorSettings {
    pub curve: CurveSettings,
    pub flow_curve_offset: f64,
    pub flow_mode: FlowMode,
    pub pro_enabled: bool,
    pub adaptive: AdaptiveTuning,
    pub write: WritePolicy,
    pub pump_off_delay_minutes: f64,
    pub mode_source: ModeSource,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            curve: CurveSettings::default(),
            flow_curve_offset: 0.0,
            flow_mode: FlowMode::Simple,
            pro_enabled: false,
            adaptive: AdaptiveTuning::default(),
            write: WritePolicy::default(),
            pump_off_delay_minutes: 5.0,
            mode_source: ModeSource::Internal,
        }
    }
}

impl SupervisorSettings {
    /// Flow strategy actually used: the adaptive supervisor needs a licence.
    pub fn effective_flow_mode(&self) -> FlowMode {
        if self.pro_enabled {
            self.flow_mode
        } else {
            FlowMode::Simple
        }
    }

    fn validate(&self) -> SupervisorResult<()> {
        ensure_finite(self.curve.heating_base_offset, "heating_base_offset")?;
        ensure_finite(self.curve.cooling_base_offset, "cooling_base_offset")?;
        ensure_finite(self.curve.heating_slope, "heating_curve_slope")?;
        ensure_finite(self.curve.cooling_slope, "cooling_curve_slope")?;
        ensure_finite(self.flow_curve_offset, "flow_curve_offset")?;
        ensure_finite(self.pump_off_delay_minutes, "pump_off_delay_minutes")?;
        WritePolicy::new(self.write.deadband, self.write.min_interval_minutes)?;
        if self.pump_off_delay_minutes < 0.0 {
            return Err(SupervisorError::InvalidArg {
                what: "pump_off_delay_minutes must be >= 0",
            });
        }
        Ok(())
    }
}

/// Outdoor readings feeding the flow strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlowInputs {
    pub outside: Option<f64>,
    pub forecast_outside: Option<f64>,
    pub forecast_solar: Option<f64>,
}

/// Outcome of one flow computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowDecision {
    pub direction: ThermalDirection,
    /// Setpoint rounded to 0.1 °C.
    pub flow: f64,
    /// Whether the write-suppression policy lets this value out.
    pub dispatch: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorDiagnostics {
    pub operation_mode: OperationMode,
    pub external_mode_source: Option<String>,
    pub auto_direction: ThermalDirection,
    pub effective_direction: Option<ThermalDirection>,
    pub pump_state: PumpState,
    pub flow_mode: FlowMode,
    pub pro_enabled: bool,
    pub known_zones: usize,
    pub display_flow: Option<f64>,
    pub last_dispatched_flow: Option<f64>,
    pub last_dispatch_at: Option<DateTime<Utc>>,
    pub flow_curve_offset: f64,
    pub flow_curve_offset_overridden: bool,
    pub breakdown: Option<FlowBreakdown>,
}

#[derive(Debug)]
pub struct Supervisor {
    settings: SupervisorSettings,
    book: DemandBook,
    auto: AutoDirection,
    mode: OperationMode,
    offset: FlowCurveOffset,
    adaptive: AdaptiveSupervisor,
    dispatcher: FlowDispatcher,
    pump: PumpTracker,
    display_flow: Option<f64>,
    breakdown: Option<FlowBreakdown>,
    observers: ObserverRegistry,
}

impl Supervisor {
    pub fn new(settings: SupervisorSettings) -> SupervisorResult<Self> {
        settings.validate()?;
        Ok(Self {
            book: DemandBook::new(),
            auto: AutoDirection::default(),
            mode: OperationMode::Auto,
            offset: FlowCurveOffset::new(settings.flow_curve_offset),
            adaptive: AdaptiveSupervisor::new(),
            dispatcher: FlowDispatcher::new(settings.write),
            pump: PumpTracker::new(settings.pump_off_delay_minutes),
            display_flow: None,
            breakdown: None,
            observers: ObserverRegistry::default(),
            settings,
        })
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    pub fn demand(&self) -> &DemandBook {
        &self.book
    }

    // ------------------------------------------------------------------
    // Demand book
    // ------------------------------------------------------------------

    /// Store a zone snapshot (`None` drops the zone).
    ///
    /// Returns `true` when the auto direction flipped, in which case every
    /// other zone should be re-evaluated.
    pub fn update_zone(&mut self, zone: &ZoneId, demand: Option<ZoneDemand>) -> bool {
        self.book.update(zone, demand);
        self.refresh_auto_direction()
    }

    /// Forget a zone that no longer exists.
    pub fn remove_zone(&mut self, zone: &ZoneId) -> bool {
        if self.book.remove(zone).is_none() {
            return false;
        }
        self.refresh_auto_direction()
    }

    fn refresh_auto_direction(&mut self) -> bool {
        if self.mode != OperationMode::Auto {
            return false;
        }
        let before = self.auto.current();
        let after = self.auto.update(&self.book);
        if before != after {
            tracing::info!(from = ?before, to = ?after, "auto direction changed");
        }
        before != after
    }

    pub fn any_zone_active(&self) -> bool {
        self.book.iter().any(|(_, d)| d.active)
    }

    // ------------------------------------------------------------------
    // Operation mode
    // ------------------------------------------------------------------

    pub fn operation_mode(&self) -> OperationMode {
        self.mode
    }

    pub fn mode_source(&self) -> &ModeSource {
        &self.settings.mode_source
    }

    /// Direction zones should drive, or `None` when switched off.
    pub fn effective_direction(&self) -> Option<ThermalDirection> {
        match self.mode {
            OperationMode::Off => None,
            OperationMode::Auto => Some(self.auto.current()),
            forced => forced.forced_direction(),
        }
    }

    /// User selection of the internal mode. Unknown strings select auto.
    ///
    /// Returns `true` when the mode changed and zones must re-evaluate.
    pub fn set_operation_mode(&mut self, raw: &str) -> bool {
        if let ModeSource::External(point) = &self.settings.mode_source {
            tracing::warn!(point = %point, requested = raw, "operation mode is driven by an external sensor");
            return false;
        }
        let mode = OperationMode::parse_option(raw).unwrap_or_else(|| {
            tracing::warn!(requested = raw, "unsupported operation mode, using auto");
            OperationMode::Auto
        });
        self.apply_mode(mode)
    }

    /// Mirror the external mode sensor. Unreadable or unknown states select auto.
    pub fn apply_external_mode(&mut self, raw: Option<&str>) -> bool {
        let mode = raw.map_or(OperationMode::Auto, OperationMode::from_external_state);
        self.apply_mode(mode)
    }

    /// Reinstate a persisted internal mode.
    pub fn restore_operation_mode(&mut self, mode: OperationMode) -> bool {
        if self.settings.mode_source != ModeSource::Internal {
            return false;
        }
        self.apply_mode(mode)
    }

    fn apply_mode(&mut self, mode: OperationMode) -> bool {
        if let Some(direction) = mode.forced_direction() {
            self.auto.seed(direction);
        }
        if mode == self.mode {
            return false;
        }
        tracing::info!(from = %self.mode, to = %mode, "operation mode changed");
        self.mode = mode;
        if mode == OperationMode::Auto {
            self.auto.update(&self.book);
        }
        self.observers.each(|o| o.operation_mode_changed(mode));
        true
    }

    // ------------------------------------------------------------------
    // Flow curve offset
    // ------------------------------------------------------------------

    pub fn flow_curve_offset(&self) -> f64 {
        self.offset.get()
    }

    /// Runtime override of the flow-curve offset; ignored without a licence.
    pub fn set_flow_curve_offset(&mut self, value: f64) -> SupervisorResult<bool> {
        if !self.settings.pro_enabled {
            tracing::debug!(value, "flow curve override ignored without pro licence");
            return Ok(false);
        }
        let changed = self.offset.set(value)?;
        if changed {
            self.notify_offset();
        }
        Ok(changed)
    }

    pub fn reset_flow_curve_offset(&mut self) -> bool {
        if !self.settings.pro_enabled {
            return false;
        }
        let changed = self.offset.reset();
        if changed {
            self.notify_offset();
        }
        changed
    }

    fn notify_offset(&mut self) {
        let value = self.offset.get();
        tracing::info!(offset = value, "flow curve offset changed");
        self.observers.each(|o| o.flow_curve_offset_changed(value));
    }

    // ------------------------------------------------------------------
    // Flow and pump
    // ------------------------------------------------------------------

    /// Compute the flow setpoint for the current demand.
    ///
    /// Returns `None` when switched off or no zone is calling. The display
    /// value is updated on every computation; only the dispatch is subject
    /// to write suppression.
    pub fn compute_flow(&mut self, inputs: &FlowInputs, now: DateTime<Utc>) -> Option<FlowDecision> {
        let direction = self.effective_direction()?;
        if !self.any_zone_active() {
            return None;
        }

        let offset = self.offset.get();
        let adaptive = direction == ThermalDirection::Heat
            && self.settings.effective_flow_mode() == FlowMode::ProSupervisor;

        let (raw, breakdown) = if adaptive {
            let (flow, breakdown) = self.adaptive.compute(
                &self.book,
                inputs,
                &self.settings.curve,
                offset,
                &self.settings.adaptive,
                now,
            );
            (flow, Some(breakdown))
        } else {
            let flow = self
                .settings
                .curve
                .simple_flow(&self.book, direction, inputs.outside, offset);
            (flow, None)
        };

        let flow = round_to(raw, 1);
        let dispatch = self.dispatcher.should_dispatch(flow, now);
        tracing::debug!(?direction, flow, dispatch, adaptive, "flow computed");

        if self.display_flow != Some(flow) {
            self.display_flow = Some(flow);
            self.observers.each(|o| o.flow_temperature_changed(Some(flow)));
        }
        if self.breakdown != breakdown {
            self.breakdown = breakdown;
            let current = self.breakdown.as_ref();
            self.observers.each(|o| o.flow_breakdown_changed(current));
        }

        Some(FlowDecision {
            direction,
            flow,
            dispatch,
        })
    }

    /// Record an acknowledged write of the flow setpoint.
    pub fn record_dispatch(&mut self, flow: f64, now: DateTime<Utc>) {
        self.dispatcher.record(flow, now);
    }

    /// Advance the pump tracker from the observed circuit states.
    ///
    /// `any_circuit_on` comes from the actuators themselves, not from the
    /// demand book: a zone dropped from the book can still hold a circuit open.
    pub fn update_pump(&mut self, any_circuit_on: bool, now: DateTime<Utc>) -> PumpState {
        let before = self.pump.state();
        let after = self
            .pump
            .update(any_circuit_on, self.effective_direction(), now);
        if before != after {
            tracing::info!(from = before.as_str(), to = after.as_str(), "heat pump state changed");
            self.observers.each(|o| o.pump_state_changed(after));
        }
        after
    }

    pub fn pump_state(&self) -> PumpState {
        self.pump.state()
    }

    pub fn display_flow(&self) -> Option<f64> {
        self.display_flow
    }

    pub fn breakdown(&self) -> Option<&FlowBreakdown> {
        self.breakdown.as_ref()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Apply new settings. Adaptive state and write history start over; the
    /// offset override survives only while still licensed.
    pub fn reload(&mut self, settings: SupervisorSettings) -> SupervisorResult<()> {
        settings.validate()?;
        let before = self.offset.get();
        self.offset.set_base(settings.flow_curve_offset);
        if !settings.pro_enabled {
            self.offset.reset();
        }
        self.adaptive.reset();
        self.dispatcher = FlowDispatcher::new(settings.write);
        self.pump.set_off_delay(settings.pump_off_delay_minutes);
        if settings.mode_source != self.settings.mode_source {
            self.mode = OperationMode::Auto;
        }
        self.settings = settings;
        if self.breakdown.take().is_some() {
            self.observers.each(|o| o.flow_breakdown_changed(None));
        }
        if before != self.offset.get() {
            self.notify_offset();
        }
        tracing::info!(
            pro = self.settings.pro_enabled,
            flow_mode = ?self.settings.effective_flow_mode(),
            "supervisor settings reloaded"
        );
        Ok(())
    }

    pub fn diagnostics(&self) -> SupervisorDiagnostics {
        SupervisorDiagnostics {
            operation_mode: self.mode,
            external_mode_source: match &self.settings.mode_source {
                ModeSource::Internal => None,
                ModeSource::External(point) => Some(point.as_str().to_string()),
            },
            auto_direction: self.auto.current(),
            effective_direction: self.effective_direction(),
            pump_state: self.pump.state(),
            flow_mode: self.settings.effective_flow_mode(),
            pro_enabled: self.settings.pro_enabled,
            known_zones: self.book.len(),
            display_flow: self.display_flow,
            last_dispatched_flow: self.dispatcher.last_value(),
            last_dispatch_at: self.dispatcher.last_dispatch_at(),
            flow_curve_offset: self.offset.get(),
            flow_curve_offset_overridden: self.offset.is_overridden(),
            breakdown: self.breakdown.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Register an observer; it immediately receives the current values.
    pub fn register_observer(&mut self, observer: Box<dyn SupervisorObserver>) -> ObserverHandle {
        let handle = self.observers.register(observer);
        let (mode, pump, offset, flow) = (
            self.mode,
            self.pump.state(),
            self.offset.get(),
            self.display_flow,
        );
        let breakdown = self.breakdown.as_ref();
        if let Some(o) = self.observers.get_mut(handle) {
            o.operation_mode_changed(mode);
            o.pump_state_changed(pump);
            o.flow_curve_offset_changed(offset);
            o.flow_temperature_changed(flow);
            o.flow_breakdown_changed(breakdown);
        }
        handle
    }

    pub fn unregister_observer(&mut self, handle: ObserverHandle) -> bool {
        self.observers.unregister(handle)
    }
}
