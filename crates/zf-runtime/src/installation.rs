//! One configured installation: a supervisor, its zones and a gateway.
//!
//! All state sits behind `RefCell`s and is only touched between awaits, so
//! the installation can be driven from several futures on one thread (timer,
//! host callbacks, user commands). Zone evaluations go through a single
//! work queue; each zone's [`EvalLatch`](crate::latch::EvalLatch) collapses
//! requests that arrive while it is queued or running into one follow-up.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use zf_core::{ActuatorPoint, HvacAction, ManualMode, OperationMode, PointId, ZoneId};
use zf_license::{Ed25519Verifier, LicenseStatus, LicenseVerifier};
use zf_project::{InstallationDef, validate_installation};
use zf_supervisor::{
    FlowInputs, ModeSource, ObserverHandle, Supervisor, SupervisorDiagnostics, SupervisorObserver,
};

use crate::error::{RuntimeError, RuntimeResult};
use crate::gateway::Gateway;
use crate::settings::{HeatSourcePoints, heat_source_points, supervisor_settings, zone_config};
use crate::zone::{PersistedZoneState, ZoneConfig, ZoneControl, ZoneController, ZoneDiagnostics};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationDiagnostics {
    pub license: LicenseStatus,
    pub supervisor: SupervisorDiagnostics,
    pub zones: Vec<ZoneDiagnostics>,
}

/// Everything restored on start: the internal mode and each zone's target
/// and manual mode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistedState {
    pub operation_mode: OperationMode,
    pub zones: BTreeMap<ZoneId, PersistedZoneState>,
}

impl PersistedState {
    pub fn to_json(&self) -> RuntimeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(raw: &str) -> RuntimeResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

enum VerifierSource {
    /// Keyring rebuilt from each configuration's key map (or the environment).
    FromConfig,
    Custom(Box<dyn LicenseVerifier>),
}

struct Compiled {
    license: LicenseStatus,
    settings: zf_supervisor::SupervisorSettings,
    points: HeatSourcePoints,
    zones: Vec<ZoneConfig>,
}

/// Observed state of one circuit during an evaluation.
struct Circuit {
    raw: String,
    point: Option<ActuatorPoint>,
    on: Option<bool>,
}

impl Circuit {
    fn any_on(circuits: &[Circuit]) -> bool {
        circuits.iter().any(|c| c.on == Some(true))
    }
}

struct DrainGuard<'a>(&'a Cell<bool>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

pub struct Installation<G: Gateway> {
    gateway: Rc<G>,
    verifier: VerifierSource,
    def: RefCell<InstallationDef>,
    license: Cell<LicenseStatus>,
    points: RefCell<HeatSourcePoints>,
    supervisor: RefCell<Supervisor>,
    zones: RefCell<BTreeMap<ZoneId, ZoneController>>,
    queue: RefCell<VecDeque<ZoneId>>,
    draining: Cell<bool>,
}

impl<G: Gateway> Installation<G> {
    /// Build an installation, verifying the licence against the configured
    /// public keys (or the environment).
    pub fn new(def: InstallationDef, gateway: Rc<G>) -> RuntimeResult<Self> {
        Self::build(def, gateway, VerifierSource::FromConfig)
    }

    /// Load, validate and build from a YAML file.
    pub fn from_yaml(path: &std::path::Path, gateway: Rc<G>) -> RuntimeResult<Self> {
        let def = zf_project::load_yaml(path)?;
        Self::new(def, gateway)
    }

    pub fn with_verifier(
        def: InstallationDef,
        gateway: Rc<G>,
        verifier: Box<dyn LicenseVerifier>,
    ) -> RuntimeResult<Self> {
        Self::build(def, gateway, VerifierSource::Custom(verifier))
    }

    fn build(def: InstallationDef, gateway: Rc<G>, verifier: VerifierSource) -> RuntimeResult<Self> {
        let compiled = compile(&def, &verifier, gateway.as_ref())?;
        let supervisor = Supervisor::new(compiled.settings)?;
        let mut zones = BTreeMap::new();
        for config in compiled.zones {
            zones.insert(config.id.clone(), ZoneController::new(config));
        }
        assign_pwm_pool(&mut zones);
        tracing::info!(
            zones = zones.len(),
            pro = compiled.license.pro_enabled,
            "installation configured"
        );
        Ok(Self {
            gateway,
            verifier,
            def: RefCell::new(def),
            license: Cell::new(compiled.license),
            points: RefCell::new(compiled.points),
            supervisor: RefCell::new(supervisor),
            zones: RefCell::new(zones),
            queue: RefCell::new(VecDeque::new()),
            draining: Cell::new(false),
        })
    }

    pub fn gateway(&self) -> &Rc<G> {
        &self.gateway
    }

    pub fn license(&self) -> LicenseStatus {
        self.license.get()
    }

    pub fn definition(&self) -> InstallationDef {
        self.def.borrow().clone()
    }

    pub fn zone_ids(&self) -> Vec<ZoneId> {
        self.zones.borrow().keys().cloned().collect()
    }

    pub fn zone(&self, zone: &ZoneId) -> Option<ZoneDiagnostics> {
        self.zones.borrow().get(zone).map(ZoneController::diagnostics)
    }

    pub fn operation_mode(&self) -> OperationMode {
        self.supervisor.borrow().operation_mode()
    }

    pub fn flow_curve_offset(&self) -> f64 {
        self.supervisor.borrow().flow_curve_offset()
    }

    pub fn diagnostics(&self) -> InstallationDiagnostics {
        InstallationDiagnostics {
            license: self.license.get(),
            supervisor: self.supervisor.borrow().diagnostics(),
            zones: self
                .zones
                .borrow()
                .values()
                .map(ZoneController::diagnostics)
                .collect(),
        }
    }

    pub fn register_observer(&self, observer: Box<dyn SupervisorObserver>) -> ObserverHandle {
        self.supervisor.borrow_mut().register_observer(observer)
    }

    pub fn unregister_observer(&self, handle: ObserverHandle) -> bool {
        self.supervisor.borrow_mut().unregister_observer(handle)
    }

    // ------------------------------------------------------------------
    // Host entry points
    // ------------------------------------------------------------------

    /// Periodic evaluation of every zone and the heat source.
    pub async fn tick(&self) {
        self.refresh_external_mode().await;
        self.schedule(self.zone_ids());
        self.drain().await;
        self.update_heat_pump_state().await;
    }

    /// A watched point changed state.
    pub async fn on_sensor_changed(&self, point: &str) {
        let external = matches!(
            self.supervisor.borrow().mode_source(),
            ModeSource::External(p) if p.as_str() == point
        );
        if external && self.refresh_external_mode().await {
            self.schedule(self.zone_ids());
        }

        let affected: Vec<ZoneId> = self
            .zones
            .borrow()
            .values()
            .filter(|z| {
                z.config()
                    .temp_sensor
                    .as_ref()
                    .is_some_and(|s| s.as_str() == point)
            })
            .map(|z| z.id().clone())
            .collect();
        self.schedule(affected);
        self.drain().await;

        let heat_source_input = {
            let points = self.points.borrow();
            points.outside.as_str() == point
                || points.forecast_outside.as_ref().is_some_and(|p| p.as_str() == point)
                || points.forecast_solar.as_ref().is_some_and(|p| p.as_str() == point)
        };
        if heat_source_input {
            self.update_heat_pump_state().await;
        }
    }

    /// The external heat-pump mode sensor reported `raw` (`None` when unreadable).
    pub async fn on_mode_sensor_changed(&self, raw: Option<&str>) {
        if matches!(self.supervisor.borrow().mode_source(), ModeSource::Internal) {
            tracing::debug!("no external mode sensor configured, ignoring mode change");
            return;
        }
        let changed = self.supervisor.borrow_mut().apply_external_mode(raw);
        if changed {
            self.reevaluate_all().await;
        }
    }

    /// Select the internal operation mode. Unknown values select auto.
    pub async fn set_operation_mode(&self, raw: &str) {
        let changed = self.supervisor.borrow_mut().set_operation_mode(raw);
        if changed {
            self.reevaluate_all().await;
        }
    }

    /// Reinstate a persisted internal mode. Ignored with an external mode sensor.
    pub fn restore_operation_mode(&self, mode: OperationMode) -> bool {
        self.supervisor.borrow_mut().restore_operation_mode(mode)
    }

    pub async fn set_flow_curve_offset(&self, value: f64) -> RuntimeResult<bool> {
        let changed = self.supervisor.borrow_mut().set_flow_curve_offset(value)?;
        if changed {
            self.reevaluate_all().await;
        }
        Ok(changed)
    }

    pub async fn reset_flow_curve_offset(&self) -> bool {
        let changed = self.supervisor.borrow_mut().reset_flow_curve_offset();
        if changed {
            self.reevaluate_all().await;
        }
        changed
    }

    pub async fn set_target(&self, zone: &ZoneId, value: f64) -> RuntimeResult<f64> {
        let stored = self.with_zone(zone, |z| z.set_target(value))??;
        self.schedule([zone.clone()]);
        self.drain().await;
        Ok(stored)
    }

    pub async fn set_manual_mode(&self, zone: &ZoneId, mode: ManualMode) -> RuntimeResult<()> {
        self.with_zone(zone, |z| z.set_manual_mode(mode))?;
        self.schedule([zone.clone()]);
        self.drain().await;
        Ok(())
    }

    /// Reinstate a persisted target and manual mode without evaluating.
    pub fn restore_zone(&self, zone: &ZoneId, state: PersistedZoneState) -> RuntimeResult<()> {
        self.with_zone(zone, |z| z.restore(state))?
    }

    pub fn persisted_zones(&self) -> BTreeMap<ZoneId, PersistedZoneState> {
        self.zones
            .borrow()
            .iter()
            .map(|(id, z)| (id.clone(), z.persisted()))
            .collect()
    }

    pub fn persisted_state(&self) -> PersistedState {
        PersistedState {
            operation_mode: self.supervisor.borrow().operation_mode(),
            zones: self.persisted_zones(),
        }
    }

    /// Restore a snapshot taken by [`Self::persisted_state`]. Zones that no
    /// longer exist are skipped.
    pub fn restore_state(&self, state: &PersistedState) -> RuntimeResult<()> {
        self.restore_operation_mode(state.operation_mode);
        for (zone, saved) in &state.zones {
            match self.restore_zone(zone, *saved) {
                Err(RuntimeError::UnknownZone(_)) => {
                    tracing::warn!(zone = %zone, "persisted state for unknown zone ignored");
                }
                other => other?,
            }
        }
        Ok(())
    }

    /// Drop a zone and stop counting it in the aggregate.
    pub async fn remove_zone(&self, zone: &ZoneId) -> RuntimeResult<()> {
        if self.zones.borrow_mut().remove(zone).is_none() {
            return Err(RuntimeError::UnknownZone(zone.to_string()));
        }
        self.queue.borrow_mut().retain(|id| id != zone);
        assign_pwm_pool(&mut self.zones.borrow_mut());
        let changed = self.supervisor.borrow_mut().remove_zone(zone);
        tracing::info!(zone = %zone, "zone removed");
        if changed {
            self.reevaluate_all().await;
        }
        Ok(())
    }

    /// Apply a new configuration.
    ///
    /// The licence is verified again and adaptive state starts over. Zones
    /// that survive keep their target and manual mode; removed zones are
    /// dropped from the aggregate.
    pub async fn reload(&self, def: InstallationDef) -> RuntimeResult<()> {
        let compiled = compile(&def, &self.verifier, self.gateway.as_ref())?;
        self.supervisor.borrow_mut().reload(compiled.settings)?;

        let mut incoming: BTreeMap<ZoneId, ZoneConfig> = compiled
            .zones
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        let removed: Vec<ZoneId> = {
            let mut zones = self.zones.borrow_mut();
            let removed: Vec<ZoneId> = zones
                .keys()
                .filter(|id| !incoming.contains_key(*id))
                .cloned()
                .collect();
            for id in &removed {
                zones.remove(id);
            }
            for (id, zone) in zones.iter_mut() {
                if let Some(config) = incoming.remove(id) {
                    zone.reconfigure(config);
                }
            }
            for (id, config) in incoming {
                zones.insert(id, ZoneController::new(config));
            }
            assign_pwm_pool(&mut zones);
            removed
        };
        {
            let mut supervisor = self.supervisor.borrow_mut();
            for id in &removed {
                supervisor.remove_zone(id);
            }
        }
        self.queue
            .borrow_mut()
            .retain(|id| !removed.contains(id));

        *self.def.borrow_mut() = def;
        *self.points.borrow_mut() = compiled.points;
        self.license.set(compiled.license);
        tracing::info!(removed = removed.len(), pro = compiled.license.pro_enabled, "installation reloaded");

        self.tick().await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Heat source
    // ------------------------------------------------------------------

    /// Recompute pump state and the flow setpoint, dispatching when the
    /// write policy allows. Pump state follows the circuit states observed
    /// during the latest zone evaluations.
    pub async fn update_heat_pump_state(&self) {
        let now = self.gateway.now();
        let calling = {
            let supervisor = self.supervisor.borrow();
            supervisor.any_zone_active() && supervisor.effective_direction().is_some()
        };

        let inputs = if calling {
            let points = self.points.borrow().clone();
            FlowInputs {
                outside: self.read_optional(Some(&points.outside), "outside temperature").await,
                forecast_outside: self
                    .read_optional(points.forecast_outside.as_ref(), "forecast outside temperature")
                    .await,
                forecast_solar: self
                    .read_optional(points.forecast_solar.as_ref(), "forecast solar irradiance")
                    .await,
            }
        } else {
            FlowInputs::default()
        };

        let circuits_on = self.zones.borrow().values().any(ZoneController::active);
        let decision = {
            let mut supervisor = self.supervisor.borrow_mut();
            supervisor.update_pump(circuits_on, now);
            supervisor.compute_flow(&inputs, now)
        };
        let Some(decision) = decision else {
            return;
        };
        if !decision.dispatch {
            tracing::debug!(flow = decision.flow, "flow write suppressed");
            return;
        }
        let target = self.points.borrow().flow_target.clone();
        let Some(target) = target else {
            tracing::debug!(flow = decision.flow, "no flow target point configured");
            return;
        };
        match self.gateway.write_numeric(&target, decision.flow).await {
            Ok(()) => {
                tracing::info!(point = %target, flow = decision.flow, "flow temperature dispatched");
                self.supervisor.borrow_mut().record_dispatch(decision.flow, now);
            }
            Err(err) => {
                tracing::warn!(point = %target, error = %err, "flow temperature write failed");
            }
        }
    }

    async fn read_optional(&self, point: Option<&PointId>, what: &str) -> Option<f64> {
        let point = point?;
        match self.gateway.read_sensor(point).await {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(point = %point, error = %err, "{what} unavailable");
                None
            }
        }
    }

    async fn refresh_external_mode(&self) -> bool {
        let point = match self.supervisor.borrow().mode_source() {
            ModeSource::External(point) => point.clone(),
            ModeSource::Internal => return false,
        };
        let raw = match self.gateway.read_text(&point).await {
            Ok(raw) => Some(raw),
            Err(err) => {
                tracing::warn!(point = %point, error = %err, "heat pump mode sensor unreadable, using auto");
                None
            }
        };
        self.supervisor.borrow_mut().apply_external_mode(raw.as_deref())
    }

    // ------------------------------------------------------------------
    // Zone evaluation
    // ------------------------------------------------------------------

    async fn reevaluate_all(&self) {
        self.schedule(self.zone_ids());
        self.drain().await;
        self.update_heat_pump_state().await;
    }

    fn with_zone<T>(&self, zone: &ZoneId, f: impl FnOnce(&mut ZoneController) -> T) -> RuntimeResult<T> {
        let mut zones = self.zones.borrow_mut();
        let controller = zones
            .get_mut(zone)
            .ok_or_else(|| RuntimeError::UnknownZone(zone.to_string()))?;
        Ok(f(controller))
    }

    fn schedule(&self, ids: impl IntoIterator<Item = ZoneId>) {
        let mut zones = self.zones.borrow_mut();
        let mut queue = self.queue.borrow_mut();
        for id in ids {
            let Some(zone) = zones.get_mut(&id) else {
                continue;
            };
            if zone.latch.request() {
                queue.push_back(id);
            }
        }
    }

    /// Run queued evaluations until the queue is empty. A nested call while
    /// draining returns at once; the active drain picks up its work.
    async fn drain(&self) {
        if self.draining.replace(true) {
            return;
        }
        let _guard = DrainGuard(&self.draining);
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(id) = next else {
                break;
            };
            if let Some(zone) = self.zones.borrow_mut().get_mut(&id) {
                zone.latch.start();
            }
            let direction_changed = self.evaluate_zone(&id).await;
            let rerun = self
                .zones
                .borrow_mut()
                .get_mut(&id)
                .is_some_and(|z| z.latch.finish());
            if rerun {
                self.queue.borrow_mut().push_back(id.clone());
            }
            if direction_changed {
                let others: Vec<ZoneId> = self.zone_ids().into_iter().filter(|z| *z != id).collect();
                self.schedule(others);
            }
            self.update_heat_pump_state().await;
        }
    }

    async fn read_circuits(&self, zone: &ZoneId, circuits: &[String]) -> Vec<Circuit> {
        let mut states = Vec::with_capacity(circuits.len());
        for raw in circuits {
            let point = match ActuatorPoint::parse(raw) {
                Ok(point) => Some(point),
                Err(err) => {
                    tracing::error!(zone = %zone, circuit = %raw, error = %err, "unsupported circuit, skipping");
                    None
                }
            };
            let on = match &point {
                Some(p) => match self.gateway.read_actuator(&p.point).await {
                    Ok(on) => Some(on),
                    Err(err) => {
                        tracing::debug!(zone = %zone, circuit = %raw, error = %err, "circuit state unknown");
                        None
                    }
                },
                None => None,
            };
            states.push(Circuit {
                raw: raw.clone(),
                point,
                on,
            });
        }
        states
    }

    /// Drive every valid circuit to `on`. Failures are logged per circuit and
    /// leave that circuit's recorded state untouched.
    async fn apply_circuits(&self, zone: &ZoneId, circuits: &mut [Circuit], on: bool) {
        for circuit in circuits.iter_mut() {
            let Some(point) = &circuit.point else {
                continue;
            };
            if circuit.on == Some(on) {
                continue;
            }
            match self.gateway.command_actuator(point, on).await {
                Ok(()) => {
                    tracing::debug!(zone = %zone, circuit = %circuit.raw, on, "circuit commanded");
                    circuit.on = Some(on);
                }
                Err(err) => {
                    tracing::error!(zone = %zone, circuit = %circuit.raw, on, error = %err, "circuit command failed");
                }
            }
        }
    }

    /// Evaluate one zone. Returns `true` when the auto direction flipped.
    async fn evaluate_zone(&self, id: &ZoneId) -> bool {
        let now = self.gateway.now();
        let plan = self.zones.borrow().get(id).map(|z| {
            (
                z.manual_mode(),
                z.config().temp_sensor.clone(),
                z.config().circuits.clone(),
            )
        });
        let Some((manual_mode, sensor, circuit_names)) = plan else {
            return false;
        };
        let mut direction_changed = false;

        if manual_mode == ManualMode::Off {
            tracing::debug!(zone = %id, "zone switched off, closing circuits");
            direction_changed |= self.supervisor.borrow_mut().update_zone(id, None);
            let mut circuits = self.read_circuits(id, &circuit_names).await;
            self.apply_circuits(id, &mut circuits, false).await;
            let active = Circuit::any_on(&circuits);
            let _ = self.with_zone(id, |z| {
                z.reset_pwm();
                let current = z.current();
                z.record(current, active, HvacAction::Off);
            });
            return direction_changed;
        }

        let current = match &sensor {
            None => {
                tracing::warn!(zone = %id, "no temperature sensor configured");
                None
            }
            Some(point) => match self.gateway.read_sensor(point).await {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!(zone = %id, sensor = %point, error = %err, "temperature unavailable");
                    None
                }
            },
        };
        let Some(current) = current else {
            direction_changed |= self.supervisor.borrow_mut().update_zone(id, None);
            let circuits = self.read_circuits(id, &circuit_names).await;
            let active = Circuit::any_on(&circuits);
            let _ = self.with_zone(id, |z| {
                let action = match z.action() {
                    HvacAction::Heating | HvacAction::Cooling if !active => HvacAction::Idle,
                    action => action,
                };
                z.record(None, active, action);
            });
            return direction_changed;
        };

        let mut circuits = self.read_circuits(id, &circuit_names).await;
        let was_active = Circuit::any_on(&circuits);

        let direction = {
            let demand = match self.zones.borrow().get(id) {
                Some(z) => z.demand(current, was_active),
                None => return direction_changed,
            };
            let mut supervisor = self.supervisor.borrow_mut();
            direction_changed |= supervisor.update_zone(id, Some(demand));
            supervisor.effective_direction()
        };

        let (on, action_when_on) = match direction {
            None => {
                tracing::debug!(zone = %id, "operation mode off, forcing circuits idle");
                (false, HvacAction::Off)
            }
            Some(direction) => {
                let on = match self.with_zone(id, |z| z.decide(current, direction, was_active, now)) {
                    Ok(on) => on,
                    Err(_) => return direction_changed,
                };
                (on, HvacAction::active_for(direction))
            }
        };

        self.apply_circuits(id, &mut circuits, on).await;
        let active = Circuit::any_on(&circuits);
        let action = match direction {
            None => HvacAction::Off,
            Some(_) if active => action_when_on,
            Some(_) => HvacAction::Idle,
        };

        let demand = {
            let mut zones = self.zones.borrow_mut();
            let Some(zone) = zones.get_mut(id) else {
                return direction_changed;
            };
            zone.record(Some(current), active, action);
            zone.demand(current, active)
        };
        direction_changed |= self.supervisor.borrow_mut().update_zone(id, Some(demand));
        tracing::debug!(zone = %id, current, active, ?action, "zone evaluated");
        direction_changed
    }
}

fn compile<G: Gateway>(
    def: &InstallationDef,
    verifier: &VerifierSource,
    gateway: &G,
) -> RuntimeResult<Compiled> {
    validate_installation(def)?;
    let now = gateway.now();
    let token = def.license_key.as_deref();
    let license = match verifier {
        VerifierSource::FromConfig => {
            let keys = (!def.license_public_keys.is_empty()).then_some(&def.license_public_keys);
            Ed25519Verifier::from_sources(keys).verify(token, now)
        }
        VerifierSource::Custom(verifier) => verifier.verify(token, now),
    };
    if !license.pro_enabled {
        let wants_pro = def.flow_mode == zf_core::FlowMode::ProSupervisor
            || def
                .zones
                .values()
                .any(|z| z.control_mode == zf_core::ControlMode::Pwm);
        if wants_pro || token.is_some() {
            tracing::warn!(reason = %license.reason, "pro features disabled");
        }
    }

    let settings = supervisor_settings(def, license.pro_enabled)?;
    let points = heat_source_points(def)?;
    let mut zones = Vec::new();
    for (name, zone) in &def.zones {
        if let Some(config) = zone_config(name, zone, license.pro_enabled)? {
            zones.push(config);
        }
    }
    Ok(Compiled {
        license,
        settings,
        points,
        zones,
    })
}

/// Index PWM zones in id order so their cycles are staggered.
fn assign_pwm_pool(zones: &mut BTreeMap<ZoneId, ZoneController>) {
    let count = zones
        .values()
        .filter(|z| matches!(z.config().control, ZoneControl::Pwm { .. }))
        .count();
    let mut index = 0;
    for zone in zones.values_mut() {
        if matches!(zone.config().control, ZoneControl::Pwm { .. }) {
            zone.set_pool_position(index, count);
            index += 1;
        }
    }
}
