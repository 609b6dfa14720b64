use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use ed25519_dalek::SigningKey;
use zf_core::{
    ActuatorPoint, ControlMode, FlowMode, HvacAction, ManualMode, OperationMode, PointId,
    PumpState, ZoneId,
};
use zf_license::{Ed25519Verifier, Keyring, LicenseClaims, LicenseReason, issue_token};
use zf_project::{InstallationDef, ZoneDef};
use zf_runtime::{
    Gateway, GatewayCommand, GatewayResult, InMemoryGateway, Installation, PersistedState,
    PersistedZoneState, RuntimeError,
};
use zf_supervisor::SupervisorObserver;

const OUTSIDE: &str = "sensor.outside";
const FLOW: &str = "input_number.hp_flow";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 7, 0, 0).unwrap()
}

fn signer() -> SigningKey {
    SigningKey::from_bytes(&[42; 32])
}

fn verifier() -> Box<Ed25519Verifier> {
    let mut ring = Keyring::new();
    ring.insert("main", signer().verifying_key()).unwrap();
    Box::new(Ed25519Verifier::new(ring))
}

fn token_issued(at: DateTime<Utc>, days: i64) -> String {
    let claims =
        LicenseClaims::for_days("zoneflow", "github:octocat", "github_sponsors", "pro", at, days)
            .unwrap();
    issue_token(&signer(), "main", &claims).unwrap()
}

fn token(days: i64) -> String {
    token_issued(t0(), days)
}

fn zone(name: &str) -> ZoneDef {
    ZoneDef::new([format!("switch.{name}")], Some(format!("sensor.{name}").as_str()))
}

fn def(zones: &[&str]) -> InstallationDef {
    let mut def = InstallationDef::new(OUTSIDE);
    def.flow_temp_sensor = Some(FLOW.to_string());
    for name in zones {
        def.zones.insert(name.to_string(), zone(name));
    }
    def
}

fn gateway() -> Rc<InMemoryGateway> {
    let gw = Rc::new(InMemoryGateway::new(t0()));
    gw.set_value(OUTSIDE, 15.0);
    gw
}

fn build(def: InstallationDef, gw: &Rc<InMemoryGateway>) -> Installation<InMemoryGateway> {
    Installation::with_verifier(def, Rc::clone(gw), verifier()).unwrap()
}

fn target(inst: &Installation<impl Gateway>, name: &str, value: f64) {
    inst.restore_zone(
        &ZoneId::from_name(name),
        PersistedZoneState {
            target: value,
            manual_mode: ManualMode::Auto,
        },
    )
    .unwrap();
}

fn action(inst: &Installation<impl Gateway>, name: &str) -> HvacAction {
    inst.zone(&ZoneId::from_name(name)).unwrap().action
}

#[tokio::test]
async fn cold_zone_turns_on_and_dispatches_flow() {
    let gw = gateway();
    gw.set_value("sensor.living", 19.0);
    gw.set_state("switch.living", "off");
    let inst = build(def(&["living"]), &gw);
    target(&inst, "living", 21.0);

    inst.tick().await;

    assert!(gw.is_on("switch.living"));
    assert_eq!(action(&inst, "living"), HvacAction::Heating);
    // 21 + 3, no weather term at 15 °C outside
    assert_eq!(gw.numeric_writes(FLOW), vec![24.0]);
    let diag = inst.diagnostics();
    assert_eq!(diag.supervisor.pump_state, PumpState::Heat);
    assert_eq!(diag.supervisor.last_dispatched_flow, Some(24.0));
    assert!(diag.zones[0].active);
}

#[tokio::test]
async fn warm_zone_stays_idle_without_flow() {
    let gw = gateway();
    gw.set_value("sensor.living", 21.1);
    gw.set_state("switch.living", "off");
    let inst = build(def(&["living"]), &gw);
    target(&inst, "living", 21.0);

    inst.tick().await;

    assert!(!gw.is_on("switch.living"));
    assert_eq!(action(&inst, "living"), HvacAction::Idle);
    assert!(gw.numeric_writes(FLOW).is_empty());
    assert_eq!(inst.diagnostics().supervisor.pump_state, PumpState::Idle);
}

#[tokio::test]
async fn missing_sensor_leaves_circuits_alone() {
    let gw = gateway();
    gw.set_state("sensor.living", "unavailable");
    gw.set_state("switch.living", "on");
    let inst = build(def(&["living"]), &gw);

    inst.tick().await;

    assert!(gw.is_on("switch.living"));
    assert!(gw.commands().is_empty());
    let diag = inst.diagnostics();
    assert_eq!(diag.supervisor.known_zones, 0);
    assert_eq!(diag.zones[0].current, None);
    assert!(diag.zones[0].active);
    assert_eq!(diag.supervisor.pump_state, PumpState::Heat);
}

#[tokio::test]
async fn lost_sensor_keeps_pump_running_while_circuit_is_open() {
    let gw = gateway();
    gw.set_value("sensor.living", 19.0);
    gw.set_state("switch.living", "off");
    let inst = build(def(&["living"]), &gw);
    target(&inst, "living", 21.0);
    inst.tick().await;
    assert!(gw.is_on("switch.living"));
    assert_eq!(inst.diagnostics().supervisor.pump_state, PumpState::Heat);

    // Well past the 5 minute off delay.
    gw.set_state("sensor.living", "unavailable");
    gw.advance(Duration::minutes(10));
    inst.tick().await;

    assert!(gw.is_on("switch.living"));
    let diag = inst.diagnostics();
    assert_eq!(diag.supervisor.known_zones, 0);
    assert!(diag.zones[0].active);
    assert_eq!(diag.supervisor.pump_state, PumpState::Heat);
}

#[tokio::test]
async fn pump_follows_circuits_switched_by_the_host() {
    let gw = gateway();
    gw.set_state("sensor.living", "unavailable");
    gw.set_state("switch.living", "off");
    let inst = build(def(&["living"]), &gw);
    inst.tick().await;
    assert_eq!(inst.diagnostics().supervisor.pump_state, PumpState::Idle);

    gw.set_state("switch.living", "on");
    gw.advance(Duration::minutes(1));
    inst.tick().await;
    assert!(gw.commands().is_empty());
    assert!(inst.diagnostics().zones[0].active);
    assert_eq!(inst.diagnostics().supervisor.pump_state, PumpState::Heat);

    gw.set_state("switch.living", "off");
    gw.advance(Duration::minutes(2));
    inst.tick().await;
    // Inside the off delay.
    assert_eq!(inst.diagnostics().supervisor.pump_state, PumpState::Heat);

    gw.advance(Duration::minutes(6));
    inst.tick().await;
    assert!(!inst.diagnostics().zones[0].active);
    assert_eq!(inst.diagnostics().supervisor.pump_state, PumpState::Idle);
}

#[tokio::test]
async fn unsupported_circuit_is_skipped() {
    let gw = gateway();
    let mut def = def(&[]);
    def.zones.insert(
        "kitchen".to_string(),
        ZoneDef::new(["light.kitchen", "switch.kitchen"], Some("sensor.kitchen")),
    );
    gw.set_value("sensor.kitchen", 18.0);
    gw.set_state("light.kitchen", "off");
    gw.set_state("switch.kitchen", "off");
    let inst = build(def, &gw);

    inst.tick().await;

    assert!(gw.is_on("switch.kitchen"));
    assert_eq!(gw.state("light.kitchen").as_deref(), Some("off"));
    assert!(!gw.commands().iter().any(|c| matches!(
        c,
        GatewayCommand::Actuator { point, .. } if point == "light.kitchen"
    )));
}

#[tokio::test]
async fn command_failure_is_isolated() {
    let gw = gateway();
    let mut def = def(&["bath"]);
    def.zones.insert(
        "living".to_string(),
        ZoneDef::new(["switch.living_a", "switch.living_b"], Some("sensor.living")),
    );
    gw.set_value("sensor.living", 18.0);
    gw.set_value("sensor.bath", 18.0);
    for sw in ["switch.living_a", "switch.living_b", "switch.bath"] {
        gw.set_state(sw, "off");
    }
    gw.reject("switch.living_a");
    let inst = build(def, &gw);

    inst.tick().await;

    assert!(!gw.is_on("switch.living_a"));
    assert!(gw.is_on("switch.living_b"));
    assert!(gw.is_on("switch.bath"));
    assert_eq!(action(&inst, "living"), HvacAction::Heating);

    // The rejected circuit is retried on the next pass.
    gw.accept("switch.living_a");
    gw.advance(Duration::minutes(1));
    inst.tick().await;
    assert!(gw.is_on("switch.living_a"));
}

#[tokio::test]
async fn operation_mode_off_forces_everything_idle() {
    let gw = gateway();
    gw.set_value("sensor.living", 18.0);
    gw.set_state("switch.living", "off");
    let inst = build(def(&["living"]), &gw);
    inst.tick().await;
    assert!(gw.is_on("switch.living"));
    let writes = gw.numeric_writes(FLOW).len();

    inst.set_operation_mode("off").await;

    assert_eq!(inst.operation_mode(), OperationMode::Off);
    assert!(!gw.is_on("switch.living"));
    assert_eq!(action(&inst, "living"), HvacAction::Off);
    assert_eq!(inst.diagnostics().supervisor.pump_state, PumpState::Idle);

    gw.advance(Duration::minutes(30));
    inst.tick().await;
    assert!(!gw.is_on("switch.living"));
    assert_eq!(gw.numeric_writes(FLOW).len(), writes);
}

#[tokio::test]
async fn direction_flip_reevaluates_other_zones() {
    let gw = gateway();
    gw.set_value("sensor.alpha", 19.0);
    gw.set_value("sensor.beta", 22.0);
    gw.set_state("switch.alpha", "off");
    gw.set_state("switch.beta", "off");
    let inst = build(def(&["alpha", "beta"]), &gw);
    target(&inst, "alpha", 21.0);
    target(&inst, "beta", 21.0);

    inst.tick().await;
    assert!(gw.is_on("switch.alpha"));
    assert!(!gw.is_on("switch.beta"));
    assert_eq!(action(&inst, "beta"), HvacAction::Idle);

    // Mean delta (4 + 1) / 2 leaves the band: cooling.
    gw.advance(Duration::minutes(1));
    gw.set_value("sensor.alpha", 25.0);
    inst.on_sensor_changed("sensor.alpha").await;

    assert_eq!(action(&inst, "alpha"), HvacAction::Cooling);
    assert!(gw.is_on("switch.beta"));
    assert_eq!(action(&inst, "beta"), HvacAction::Cooling);
    // 21 - 2.5
    assert_eq!(gw.numeric_writes(FLOW).last(), Some(&18.5));
}

#[tokio::test]
async fn manual_off_closes_circuits_and_leaves_aggregate() {
    let gw = gateway();
    gw.set_value("sensor.living", 18.0);
    gw.set_state("switch.living", "off");
    let inst = build(def(&["living"]), &gw);
    inst.tick().await;
    assert!(gw.is_on("switch.living"));

    let id = ZoneId::from_name("living");
    inst.set_manual_mode(&id, ManualMode::Off).await.unwrap();

    assert!(!gw.is_on("switch.living"));
    assert_eq!(action(&inst, "living"), HvacAction::Off);
    assert_eq!(inst.diagnostics().supervisor.known_zones, 0);
}

#[tokio::test]
async fn set_target_clamps_and_reevaluates() {
    let gw = gateway();
    gw.set_value("sensor.living", 20.1);
    gw.set_state("switch.living", "off");
    let inst = build(def(&["living"]), &gw);
    inst.tick().await;
    assert!(!gw.is_on("switch.living"));

    let id = ZoneId::from_name("living");
    assert_eq!(inst.set_target(&id, 40.0).await.unwrap(), 30.0);
    assert!(gw.is_on("switch.living"));

    let missing = ZoneId::from_name("garage");
    assert!(matches!(
        inst.set_target(&missing, 20.0).await,
        Err(RuntimeError::UnknownZone(_))
    ));
}

#[tokio::test]
async fn external_mode_sensor_drives_operation_mode() {
    let gw = gateway();
    gw.set_value("sensor.living", 18.0);
    gw.set_state("switch.living", "off");
    gw.set_state("sensor.hp_mode", "Cooling");
    let mut def = def(&["living"]);
    def.heat_pump_mode = Some("sensor.hp_mode".to_string());
    let inst = build(def, &gw);

    inst.tick().await;
    assert_eq!(inst.operation_mode(), OperationMode::Cool);
    // Cooling while below target: nothing to do.
    assert!(!gw.is_on("switch.living"));

    gw.set_state("sensor.hp_mode", "heat");
    inst.on_sensor_changed("sensor.hp_mode").await;
    assert_eq!(inst.operation_mode(), OperationMode::Heat);
    assert!(gw.is_on("switch.living"));

    // The internal selector is ignored while a sensor is configured.
    inst.set_operation_mode("off").await;
    assert_eq!(inst.operation_mode(), OperationMode::Heat);

    inst.on_mode_sensor_changed(Some("defrost")).await;
    assert_eq!(inst.operation_mode(), OperationMode::Auto);
}

#[tokio::test]
async fn pro_features_follow_the_licence() {
    let gw = gateway();
    let mut def = def(&[]);
    def.flow_mode = FlowMode::ProSupervisor;
    for name in ["den", "office"] {
        let mut z = zone(name);
        z.control_mode = ControlMode::Pwm;
        def.zones.insert(name.to_string(), z);
    }

    let free = build(def.clone(), &gw);
    assert!(!free.license().pro_enabled);
    assert_eq!(free.license().reason, LicenseReason::MissingToken);
    let diag = free.diagnostics();
    assert!(diag.zones.iter().all(|z| z.control_mode == ControlMode::BangBang));
    assert_eq!(diag.supervisor.flow_mode, FlowMode::Simple);
    assert!(!diag.supervisor.pro_enabled);

    def.license_key = Some(token(30));
    let pro = build(def.clone(), &gw);
    assert!(pro.license().pro_enabled);
    assert_eq!(pro.diagnostics().supervisor.flow_mode, FlowMode::ProSupervisor);
    let zones = pro.diagnostics().zones;
    assert!(zones.iter().all(|z| z.control_mode == ControlMode::Pwm));
    assert_eq!(zones[0].pwm_pool_index, Some(0));
    assert_eq!(zones[1].pwm_pool_index, Some(1));
    assert_eq!(zones[1].pwm_pool_size, Some(2));

    def.license_key = Some(token_issued(t0() - Duration::days(40), 30));
    let expired = build(def, &gw);
    assert_eq!(expired.license().reason, LicenseReason::TokenExpired);
}

#[tokio::test]
async fn flow_offset_requires_licence_and_is_cleared_on_downgrade() {
    let gw = gateway();
    gw.set_value("sensor.living", 18.0);
    gw.set_state("switch.living", "off");
    let mut licensed = def(&["living"]);
    licensed.license_key = Some(token(30));
    let inst = build(licensed.clone(), &gw);

    assert!(inst.set_flow_curve_offset(1.5).await.unwrap());
    assert_eq!(inst.flow_curve_offset(), 1.5);
    assert!(inst.set_flow_curve_offset(f64::NAN).await.is_err());

    let mut free = licensed;
    free.license_key = None;
    inst.reload(free).await.unwrap();
    assert!(!inst.license().pro_enabled);
    assert_eq!(inst.flow_curve_offset(), 0.0);
    assert!(!inst.set_flow_curve_offset(2.0).await.unwrap());
    assert_eq!(inst.flow_curve_offset(), 0.0);
}

#[tokio::test]
async fn reload_keeps_surviving_zones_and_drops_removed() {
    let gw = gateway();
    gw.set_value("sensor.living", 20.0);
    gw.set_value("sensor.bath", 20.0);
    gw.set_state("switch.living", "off");
    gw.set_state("switch.bath", "off");
    let inst = build(def(&["living", "bath"]), &gw);
    target(&inst, "living", 22.5);
    inst.tick().await;
    assert_eq!(inst.diagnostics().supervisor.known_zones, 2);

    inst.reload(def(&["living"])).await.unwrap();

    let living = ZoneId::from_name("living");
    let bath = ZoneId::from_name("bath");
    assert_eq!(inst.zone(&living).unwrap().target, 22.5);
    assert!(inst.zone(&bath).is_none());
    assert_eq!(inst.diagnostics().supervisor.known_zones, 1);
    assert!(matches!(
        inst.set_target(&bath, 20.0).await,
        Err(RuntimeError::UnknownZone(_))
    ));
    assert!(matches!(
        inst.remove_zone(&bath).await,
        Err(RuntimeError::UnknownZone(_))
    ));
}

#[tokio::test]
async fn persisted_state_round_trips_through_json() {
    let gw = gateway();
    let inst = build(def(&["living", "bath"]), &gw);
    target(&inst, "living", 23.0);
    inst.set_manual_mode(&ZoneId::from_name("bath"), ManualMode::Off)
        .await
        .unwrap();
    inst.set_operation_mode("heat").await;

    let json = inst.persisted_state().to_json().unwrap();

    let fresh = build(def(&["living", "bath"]), &gw);
    let mut state = PersistedState::from_json(&json).unwrap();
    state.zones.insert(
        ZoneId::from_name("garage"),
        PersistedZoneState {
            target: 18.0,
            manual_mode: ManualMode::Auto,
        },
    );
    fresh.restore_state(&state).unwrap();

    assert_eq!(fresh.operation_mode(), OperationMode::Heat);
    assert_eq!(fresh.zone(&ZoneId::from_name("living")).unwrap().target, 23.0);
    assert_eq!(
        fresh.zone(&ZoneId::from_name("bath")).unwrap().manual_mode,
        ManualMode::Off
    );
}

#[tokio::test]
async fn write_suppression_holds_small_changes() {
    let gw = gateway();
    gw.set_value("sensor.living", 18.0);
    gw.set_state("switch.living", "off");
    let inst = build(def(&["living"]), &gw);
    inst.tick().await;
    // 20 + 3
    assert_eq!(gw.numeric_writes(FLOW), vec![23.0]);

    // 14.6 °C outside adds 0.1: inside the deadband.
    gw.set_value(OUTSIDE, 14.6);
    gw.advance(Duration::minutes(2));
    inst.on_sensor_changed(OUTSIDE).await;
    assert_eq!(gw.numeric_writes(FLOW), vec![23.0]);
    assert_eq!(inst.diagnostics().supervisor.display_flow, Some(23.1));

    gw.advance(Duration::minutes(10));
    inst.tick().await;
    assert_eq!(gw.numeric_writes(FLOW), vec![23.0, 23.1]);
}

#[tokio::test]
async fn observers_see_flow_and_pump_changes() {
    #[derive(Default)]
    struct Seen {
        flows: Vec<Option<f64>>,
        pumps: Vec<PumpState>,
    }
    struct Recorder(Rc<RefCell<Seen>>);
    impl SupervisorObserver for Recorder {
        fn flow_temperature_changed(&mut self, flow: Option<f64>) {
            self.0.borrow_mut().flows.push(flow);
        }
        fn pump_state_changed(&mut self, state: PumpState) {
            self.0.borrow_mut().pumps.push(state);
        }
    }

    let gw = gateway();
    gw.set_value("sensor.living", 18.0);
    gw.set_state("switch.living", "off");
    let inst = build(def(&["living"]), &gw);
    let seen = Rc::new(RefCell::new(Seen::default()));
    let handle = inst.register_observer(Box::new(Recorder(Rc::clone(&seen))));

    inst.tick().await;
    assert_eq!(seen.borrow().flows.last(), Some(&Some(23.0)));
    assert_eq!(seen.borrow().pumps.last(), Some(&PumpState::Heat));

    assert!(inst.unregister_observer(handle));
    assert!(!inst.unregister_observer(handle));
}

/// Gateway that yields on every sensor read and counts reads per point.
struct YieldingGateway {
    inner: InMemoryGateway,
    reads: RefCell<BTreeMap<String, usize>>,
    in_flight: Cell<usize>,
    max_in_flight: Cell<usize>,
}

impl YieldingGateway {
    fn new(inner: InMemoryGateway) -> Rc<Self> {
        Rc::new(Self {
            inner,
            reads: RefCell::new(BTreeMap::new()),
            in_flight: Cell::new(0),
            max_in_flight: Cell::new(0),
        })
    }

    fn reads(&self, point: &str) -> usize {
        self.reads.borrow().get(point).copied().unwrap_or(0)
    }
}

#[async_trait(?Send)]
impl Gateway for YieldingGateway {
    async fn read_sensor(&self, point: &PointId) -> GatewayResult<f64> {
        *self.reads.borrow_mut().entry(point.to_string()).or_default() += 1;
        self.in_flight.set(self.in_flight.get() + 1);
        self.max_in_flight
            .set(self.max_in_flight.get().max(self.in_flight.get()));
        tokio::task::yield_now().await;
        self.in_flight.set(self.in_flight.get() - 1);
        self.inner.read_sensor(point).await
    }

    async fn read_text(&self, point: &PointId) -> GatewayResult<String> {
        self.inner.read_text(point).await
    }

    async fn read_actuator(&self, point: &PointId) -> GatewayResult<bool> {
        self.inner.read_actuator(point).await
    }

    async fn command_actuator(&self, point: &ActuatorPoint, on: bool) -> GatewayResult<()> {
        self.inner.command_actuator(point, on).await
    }

    async fn write_numeric(&self, point: &PointId, value: f64) -> GatewayResult<()> {
        self.inner.write_numeric(point, value).await
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.now()
    }
}

#[tokio::test]
async fn concurrent_triggers_coalesce_into_one_follow_up() {
    let inner = InMemoryGateway::new(t0());
    inner.set_value(OUTSIDE, 15.0);
    inner.set_value("sensor.living", 18.0);
    inner.set_state("switch.living", "off");
    let gw = YieldingGateway::new(inner);
    let inst = Installation::with_verifier(def(&["living"]), Rc::clone(&gw), verifier()).unwrap();

    tokio::join!(
        inst.on_sensor_changed("sensor.living"),
        inst.on_sensor_changed("sensor.living"),
        inst.on_sensor_changed("sensor.living"),
        inst.on_sensor_changed("sensor.living"),
    );

    // One run plus exactly one follow-up, never overlapping.
    assert_eq!(gw.reads("sensor.living"), 2);
    assert_eq!(gw.max_in_flight.get(), 1);
    assert!(gw.inner.is_on("switch.living"));
}

#[tokio::test]
async fn direction_flip_does_not_repeat_queued_zones() {
    let inner = InMemoryGateway::new(t0());
    inner.set_value(OUTSIDE, 15.0);
    inner.set_value("sensor.alpha", 25.0);
    inner.set_value("sensor.beta", 21.0);
    inner.set_state("switch.alpha", "off");
    inner.set_state("switch.beta", "off");
    let gw = YieldingGateway::new(inner);
    let inst =
        Installation::with_verifier(def(&["alpha", "beta"]), Rc::clone(&gw), verifier()).unwrap();
    target(&inst, "alpha", 21.0);
    target(&inst, "beta", 21.0);

    // alpha runs first and flips auto to cooling while beta is still queued.
    inst.tick().await;

    assert_eq!(inst.diagnostics().supervisor.auto_direction, zf_core::ThermalDirection::Cool);
    assert_eq!(gw.reads("sensor.alpha"), 1);
    assert_eq!(gw.reads("sensor.beta"), 1);
    assert!(gw.inner.is_on("switch.alpha"));
}
