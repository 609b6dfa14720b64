//! Compile an [`InstallationDef`] into runtime settings.
//!
//! Licence gating happens here: without a valid licence the adaptive flow
//! mode and PWM zones are downgraded, never rejected.

use zf_controls::{BangBang, DutyController, PwmTiming};
use zf_core::{ControlMode, FlowMode, PointId, ZoneId};
use zf_project::{InstallationDef, ProSupervisorDef, PwmDef, ZoneDef};
use zf_supervisor::{AdaptiveTuning, CurveSettings, ModeSource, SupervisorSettings, WritePolicy};

use crate::error::{RuntimeError, RuntimeResult};
use crate::zone::{ZoneConfig, ZoneControl};

/// Points read by the heat-source side of the installation.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatSourcePoints {
    pub outside: PointId,
    pub flow_target: Option<PointId>,
    pub forecast_outside: Option<PointId>,
    pub forecast_solar: Option<PointId>,
}

fn optional_point(raw: Option<&String>) -> RuntimeResult<Option<PointId>> {
    raw.map(|p| PointId::parse(p)).transpose().map_err(RuntimeError::from)
}

pub fn heat_source_points(def: &InstallationDef) -> RuntimeResult<HeatSourcePoints> {
    Ok(HeatSourcePoints {
        outside: PointId::parse(&def.outside_temp_sensor)?,
        flow_target: optional_point(def.flow_temp_sensor.as_ref())?,
        forecast_outside: optional_point(def.forecast_outside_temp_sensor.as_ref())?,
        forecast_solar: optional_point(def.forecast_solar_irradiance_sensor.as_ref())?,
    })
}

pub fn adaptive_tuning(def: &ProSupervisorDef) -> AdaptiveTuning {
    AdaptiveTuning {
        error_norm_max: def.error_norm_max,
        duty_ema_minutes: def.duty_ema_minutes,
        error_weight: def.error_weight,
        duty_weight: def.duty_weight,
        slow_mix_weight: def.slow_mix_weight,
        fast_mix_weight: def.fast_mix_weight,
        kp: def.kp,
        use_integral: def.use_integral,
        ti_minutes: def.ti_minutes,
        i_max: def.i_max,
        fast_error_deadband_c: def.fast_error_deadband_c,
        fast_boost_gain: def.fast_boost_gain,
        fast_boost_cap_c: def.fast_boost_cap_c,
        preheat_enabled: def.preheat_enabled,
        preheat_gain: def.preheat_gain,
        preheat_solar_gain_per_w_m2: def.preheat_solar_gain_per_w_m2,
        preheat_cap_c: def.preheat_cap_c,
        preheat_min_slow_di: def.preheat_min_slow_di,
        slew_up_c_per_5m: def.slew_up_c_per_5m,
        slew_down_c_per_5m: def.slew_down_c_per_5m,
    }
}

pub fn supervisor_settings(
    def: &InstallationDef,
    pro_enabled: bool,
) -> RuntimeResult<SupervisorSettings> {
    let mode_source = match &def.heat_pump_mode {
        Some(point) => ModeSource::External(PointId::parse(point)?),
        None => ModeSource::Internal,
    };
    if !pro_enabled && def.flow_mode == FlowMode::ProSupervisor {
        tracing::warn!("pro supervisor flow mode requires a valid licence, using simple curve");
    }
    Ok(SupervisorSettings {
        curve: CurveSettings {
            heating_base_offset: def.heating_base_offset,
            cooling_base_offset: def.cooling_base_offset,
            heating_slope: def.heating_curve_slope,
            cooling_slope: def.cooling_curve_slope,
        },
        flow_curve_offset: def.flow_curve_offset,
        flow_mode: def.flow_mode,
        pro_enabled,
        adaptive: adaptive_tuning(&def.pro_supervisor),
        write: WritePolicy::new(def.flow_write_deadband, def.flow_write_min_interval_minutes)?,
        pump_off_delay_minutes: def.pump_off_delay_minutes,
        mode_source,
    })
}

fn minutes_u32(value: i64, what: &'static str) -> RuntimeResult<u32> {
    u32::try_from(value).map_err(|_| RuntimeError::InvalidArg { what })
}

fn pwm_control(name: &str, def: &PwmDef) -> RuntimeResult<ZoneControl> {
    let timing = PwmTiming::new(
        minutes_u32(def.cycle_time_minutes, "pwm cycle_time_minutes")?,
        minutes_u32(def.min_on_time_minutes, "pwm min_on_time_minutes")?,
        minutes_u32(def.min_off_time_minutes, "pwm min_off_time_minutes")?,
        minutes_u32(def.actuator_delay_minutes, "pwm actuator_delay_minutes")?,
    )
    .map_err(|source| RuntimeError::ZoneConfig {
        zone: name.to_string(),
        source,
    })?;
    let pi = DutyController::new(def.kp, def.ki).map_err(|source| RuntimeError::ZoneConfig {
        zone: name.to_string(),
        source,
    })?;
    Ok(ZoneControl::Pwm { pi, timing })
}

/// Build one zone's configuration.
///
/// Returns `Ok(None)` for a zone without circuits, which is skipped.
pub fn zone_config(name: &str, def: &ZoneDef, pro_enabled: bool) -> RuntimeResult<Option<ZoneConfig>> {
    if def.circuits.is_empty() {
        tracing::error!(zone = name, "zone has no circuits configured, skipping");
        return Ok(None);
    }
    let control = match def.control_mode {
        ControlMode::Pwm if pro_enabled => pwm_control(name, &def.pwm)?,
        ControlMode::Pwm => {
            tracing::warn!(zone = name, "PWM control requires a valid licence, using bang-bang");
            ZoneControl::BangBang
        }
        ControlMode::BangBang => ZoneControl::BangBang,
    };
    let bang_bang = BangBang::new(def.hysteresis).map_err(|source| RuntimeError::ZoneConfig {
        zone: name.to_string(),
        source,
    })?;
    Ok(Some(ZoneConfig {
        id: ZoneId::from_name(name),
        name: name.to_string(),
        circuits: def.circuits.clone(),
        temp_sensor: optional_point(def.temp_sensor.as_ref())?,
        bang_bang,
        control,
        response: def.zone_response,
        flow_weight: def.zone_flow_weight,
        solar_weight: def.zone_solar_weight,
    }))
}
