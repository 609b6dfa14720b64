use std::path::Path;

use zf_core::{ControlMode, FlowMode, ZoneResponse};
use zf_project::{InstallationDef, ZoneDef, load_yaml, parse_yaml, save_yaml};

#[test]
fn demo_installation_loads_and_validates() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/zoneflow.yaml");
    let installation =
        load_yaml(&path).unwrap_or_else(|e| panic!("Failed to load {}: {}", path.display(), e));

    assert_eq!(installation.zones.len(), 3);
    let office = &installation.zones["Office"];
    assert_eq!(office.circuits, vec!["switch.office_loop".to_string()]);
    assert_eq!(office.control_mode, ControlMode::Pwm);
    assert_eq!(installation.zones["Bathroom"].zone_response, ZoneResponse::Fast);
}

#[test]
fn defaults_fill_missing_keys() {
    let installation = parse_yaml(
        r#"
outside_temp_sensor: sensor.outside
zones:
  hall:
    circuits: [switch.hall]
    temp_sensor: sensor.hall
"#,
    )
    .unwrap();

    assert_eq!(installation.heating_base_offset, 3.0);
    assert_eq!(installation.cooling_base_offset, 2.5);
    assert_eq!(installation.heating_curve_slope, 0.25);
    assert_eq!(installation.cooling_curve_slope, 0.20);
    assert_eq!(installation.flow_curve_offset, 0.0);
    assert_eq!(installation.flow_mode, FlowMode::Simple);
    assert_eq!(installation.pump_off_delay_minutes, 5.0);
    assert_eq!(installation.flow_write_deadband, 0.3);
    assert_eq!(installation.flow_write_min_interval_minutes, 10.0);
    assert_eq!(installation.pro_supervisor.error_norm_max, 2.0);
    assert_eq!(installation.pro_supervisor.slew_down_c_per_5m, 0.2);

    let hall = &installation.zones["hall"];
    assert_eq!(hall.hysteresis, 0.3);
    assert_eq!(hall.control_mode, ControlMode::BangBang);
    assert_eq!(hall.pwm.cycle_time_minutes, 15);
    assert_eq!(hall.pwm.kp, 30.0);
    assert_eq!(hall.zone_flow_weight, 1.0);
}

#[test]
fn partial_pro_supervisor_block_keeps_other_defaults() {
    let installation = parse_yaml(
        r#"
outside_temp_sensor: sensor.outside
flow_mode: pro_supervisor
pro_supervisor:
  kp: 2.5
  preheat_enabled: true
"#,
    )
    .unwrap();
    assert_eq!(installation.flow_mode, FlowMode::ProSupervisor);
    assert_eq!(installation.pro_supervisor.kp, 2.5);
    assert!(installation.pro_supervisor.preheat_enabled);
    assert_eq!(installation.pro_supervisor.preheat_gain, 0.35);
}

#[test]
fn zone_without_circuits_is_accepted() {
    let installation = parse_yaml(
        r#"
outside_temp_sensor: sensor.outside
zones:
  attic:
    temp_sensor: sensor.attic
"#,
    )
    .unwrap();
    assert!(installation.zones["attic"].circuits.is_empty());
}

#[test]
fn roundtrip_yaml() {
    let mut installation = InstallationDef::new("sensor.outside");
    installation.flow_temp_sensor = Some("input_number.flow".to_string());
    installation.license_key = Some("a.b.c".to_string());
    let mut zone = ZoneDef::new(["switch.a", "input_boolean.b"], Some("sensor.a"));
    zone.control_mode = ControlMode::Pwm;
    zone.pwm.actuator_delay_minutes = 2;
    installation.zones.insert("Zone A".to_string(), zone);

    let path = std::env::temp_dir().join("zf_project_roundtrip.yaml");
    save_yaml(&path, &installation).unwrap();
    let loaded = load_yaml(&path).unwrap();
    assert_eq!(installation, loaded);
}
