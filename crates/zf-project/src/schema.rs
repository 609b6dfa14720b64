//! Installation schema definitions.
//!
//! Point ids are kept as plain strings here; [`crate::validate_installation`]
//! checks their shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zf_core::{ControlMode, FlowMode, ZoneResponse};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstallationDef {
    pub outside_temp_sensor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_temp_sensor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heat_pump_mode: Option<String>,

    #[serde(default = "default_heating_base_offset")]
    pub heating_base_offset: f64,
    #[serde(default = "default_cooling_base_offset")]
    pub cooling_base_offset: f64,
    #[serde(default = "default_heating_curve_slope")]
    pub heating_curve_slope: f64,
    #[serde(default = "default_cooling_curve_slope")]
    pub cooling_curve_slope: f64,
    #[serde(default)]
    pub flow_curve_offset: f64,

    #[serde(default)]
    pub flow_mode: FlowMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub license_public_keys: BTreeMap<String, String>,

    #[serde(default = "default_pump_off_delay_minutes")]
    pub pump_off_delay_minutes: f64,
    #[serde(default = "default_flow_write_deadband")]
    pub flow_write_deadband: f64,
    #[serde(default = "default_flow_write_min_interval_minutes")]
    pub flow_write_min_interval_minutes: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast_outside_temp_sensor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast_solar_irradiance_sensor: Option<String>,
    #[serde(default)]
    pub pro_supervisor: ProSupervisorDef,

    #[serde(default)]
    pub zones: BTreeMap<String, ZoneDef>,
}

impl InstallationDef {
    /// Minimal installation with every optional key at its default.
    pub fn new(outside_temp_sensor: impl Into<String>) -> Self {
        Self {
            outside_temp_sensor: outside_temp_sensor.into(),
            flow_temp_sensor: None,
            heat_pump_mode: None,
            heating_base_offset: default_heating_base_offset(),
            cooling_base_offset: default_cooling_base_offset(),
            heating_curve_slope: default_heating_curve_slope(),
            cooling_curve_slope: default_cooling_curve_slope(),
            flow_curve_offset: 0.0,
            flow_mode: FlowMode::Simple,
            license_key: None,
            license_public_keys: BTreeMap::new(),
            pump_off_delay_minutes: default_pump_off_delay_minutes(),
            flow_write_deadband: default_flow_write_deadband(),
            flow_write_min_interval_minutes: default_flow_write_min_interval_minutes(),
            forecast_outside_temp_sensor: None,
            forecast_solar_irradiance_sensor: None,
            pro_supervisor: ProSupervisorDef::default(),
            zones: BTreeMap::new(),
        }
    }
}

/// Tuning of the adaptive heating supervisor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProSupervisorDef {
    pub error_norm_max: f64,
    pub duty_ema_minutes: f64,
    pub error_weight: f64,
    pub duty_weight: f64,
    pub slow_mix_weight: f64,
    pub fast_mix_weight: f64,
    pub kp: f64,
    pub use_integral: bool,
    pub ti_minutes: f64,
    pub i_max: f64,
    pub fast_error_deadband_c: f64,
    pub fast_boost_gain: f64,
    pub fast_boost_cap_c: f64,
    pub preheat_enabled: bool,
    pub preheat_gain: f64,
    pub preheat_solar_gain_per_w_m2: f64,
    pub preheat_cap_c: f64,
    pub preheat_min_slow_di: f64,
    pub slew_up_c_per_5m: f64,
    pub slew_down_c_per_5m: f64,
}

impl Default for ProSupervisorDef {
    fn default() -> Self {
        Self {
            error_norm_max: 2.0,
            duty_ema_minutes: 20.0,
            error_weight: 0.6,
            duty_weight: 0.4,
            slow_mix_weight: 0.8,
            fast_mix_weight: 0.2,
            kp: 1.0,
            use_integral: false,
            ti_minutes: 180.0,
            i_max: 1.5,
            fast_error_deadband_c: 0.4,
            fast_boost_gain: 1.2,
            fast_boost_cap_c: 1.2,
            preheat_enabled: false,
            preheat_gain: 0.35,
            preheat_solar_gain_per_w_m2: 0.0,
            preheat_cap_c: 1.2,
            preheat_min_slow_di: 0.25,
            slew_up_c_per_5m: 0.3,
            slew_down_c_per_5m: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZoneDef {
    #[serde(default, alias = "groups")]
    pub circuits: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_sensor: Option<String>,
    #[serde(default = "default_hysteresis")]
    pub hysteresis: f64,
    #[serde(default)]
    pub control_mode: ControlMode,
    #[serde(default)]
    pub pwm: PwmDef,
    #[serde(default)]
    pub zone_response: ZoneResponse,
    #[serde(default = "default_weight")]
    pub zone_flow_weight: f64,
    #[serde(default = "default_weight")]
    pub zone_solar_weight: f64,
}

impl ZoneDef {
    pub fn new<I, S>(circuits: I, temp_sensor: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            circuits: circuits.into_iter().map(Into::into).collect(),
            temp_sensor: temp_sensor.map(str::to_string),
            hysteresis: default_hysteresis(),
            control_mode: ControlMode::BangBang,
            pwm: PwmDef::default(),
            zone_response: ZoneResponse::Slow,
            zone_flow_weight: default_weight(),
            zone_solar_weight: default_weight(),
        }
    }
}

/// PWM tuning. Only read when `control_mode` is `pwm`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PwmDef {
    pub cycle_time_minutes: i64,
    pub min_on_time_minutes: i64,
    pub min_off_time_minutes: i64,
    pub actuator_delay_minutes: i64,
    pub kp: f64,
    pub ki: f64,
}

impl Default for PwmDef {
    fn default() -> Self {
        Self {
            cycle_time_minutes: 15,
            min_on_time_minutes: 3,
            min_off_time_minutes: 3,
            actuator_delay_minutes: 0,
            kp: 30.0,
            ki: 2.0,
        }
    }
}

fn default_heating_base_offset() -> f64 {
    3.0
}

fn default_cooling_base_offset() -> f64 {
    2.5
}

fn default_heating_curve_slope() -> f64 {
    0.25
}

fn default_cooling_curve_slope() -> f64 {
    0.20
}

fn default_pump_off_delay_minutes() -> f64 {
    5.0
}

fn default_flow_write_deadband() -> f64 {
    0.3
}

fn default_flow_write_min_interval_minutes() -> f64 {
    10.0
}

fn default_hysteresis() -> f64 {
    0.3
}

fn default_weight() -> f64 {
    1.0
}
