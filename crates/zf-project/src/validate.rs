//! Installation validation logic.

use zf_core::{ControlMode, PointId};

use crate::schema::{InstallationDef, ProSupervisorDef, PwmDef, ZoneDef};

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Malformed point id '{point}' in {context}: {reason}")]
    MalformedPoint {
        point: String,
        context: String,
        reason: String,
    },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Duplicate zone id '{id}' (from '{first}' and '{second}')")]
    DuplicateZone {
        id: String,
        first: String,
        second: String,
    },
}

fn check_point(raw: &str, context: impl Into<String>) -> Result<(), ValidationError> {
    PointId::parse(raw).map(|_| ()).map_err(|err| ValidationError::MalformedPoint {
        point: raw.to_string(),
        context: context.into(),
        reason: err.to_string(),
    })
}

fn check_optional_point(raw: Option<&str>, context: &str) -> Result<(), ValidationError> {
    match raw {
        Some(point) => check_point(point, context),
        None => Ok(()),
    }
}

fn invalid(field: impl Into<String>, value: impl ToString, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn check_finite(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, value, "must be finite"))
    }
}

fn check_non_negative(field: &str, value: f64) -> Result<(), ValidationError> {
    check_finite(field, value)?;
    if value < 0.0 {
        return Err(invalid(field, value, "must be non-negative"));
    }
    Ok(())
}

pub fn validate_installation(def: &InstallationDef) -> Result<(), ValidationError> {
    check_point(&def.outside_temp_sensor, "outside_temp_sensor")?;
    check_optional_point(def.flow_temp_sensor.as_deref(), "flow_temp_sensor")?;
    check_optional_point(def.heat_pump_mode.as_deref(), "heat_pump_mode")?;
    check_optional_point(
        def.forecast_outside_temp_sensor.as_deref(),
        "forecast_outside_temp_sensor",
    )?;
    check_optional_point(
        def.forecast_solar_irradiance_sensor.as_deref(),
        "forecast_solar_irradiance_sensor",
    )?;

    check_finite("heating_base_offset", def.heating_base_offset)?;
    check_finite("cooling_base_offset", def.cooling_base_offset)?;
    check_finite("flow_curve_offset", def.flow_curve_offset)?;
    check_non_negative("heating_curve_slope", def.heating_curve_slope)?;
    check_non_negative("cooling_curve_slope", def.cooling_curve_slope)?;
    check_non_negative("pump_off_delay_minutes", def.pump_off_delay_minutes)?;
    check_non_negative("flow_write_deadband", def.flow_write_deadband)?;
    check_non_negative(
        "flow_write_min_interval_minutes",
        def.flow_write_min_interval_minutes,
    )?;

    for kid in def.license_public_keys.keys() {
        if kid.trim().is_empty() {
            return Err(invalid("license_public_keys", "''", "key id must not be blank"));
        }
    }

    validate_pro_supervisor(&def.pro_supervisor)?;

    let mut seen = std::collections::BTreeMap::new();
    for (name, zone) in &def.zones {
        let id = zf_core::ZoneId::from_name(name);
        if id.as_str().is_empty() {
            return Err(invalid(format!("zones.{name}"), name, "name has no usable characters"));
        }
        if let Some(first) = seen.insert(id.clone(), name.clone()) {
            return Err(ValidationError::DuplicateZone {
                id: id.to_string(),
                first,
                second: name.clone(),
            });
        }
        validate_zone(name, zone)?;
    }

    Ok(())
}

fn validate_pro_supervisor(pro: &ProSupervisorDef) -> Result<(), ValidationError> {
    let fields = [
        ("error_norm_max", pro.error_norm_max),
        ("duty_ema_minutes", pro.duty_ema_minutes),
        ("error_weight", pro.error_weight),
        ("duty_weight", pro.duty_weight),
        ("slow_mix_weight", pro.slow_mix_weight),
        ("fast_mix_weight", pro.fast_mix_weight),
        ("kp", pro.kp),
        ("ti_minutes", pro.ti_minutes),
        ("i_max", pro.i_max),
        ("fast_error_deadband_c", pro.fast_error_deadband_c),
        ("fast_boost_gain", pro.fast_boost_gain),
        ("fast_boost_cap_c", pro.fast_boost_cap_c),
        ("preheat_gain", pro.preheat_gain),
        ("preheat_solar_gain_per_w_m2", pro.preheat_solar_gain_per_w_m2),
        ("preheat_cap_c", pro.preheat_cap_c),
        ("preheat_min_slow_di", pro.preheat_min_slow_di),
        ("slew_up_c_per_5m", pro.slew_up_c_per_5m),
        ("slew_down_c_per_5m", pro.slew_down_c_per_5m),
    ];
    for (field, value) in fields {
        check_non_negative(&format!("pro_supervisor.{field}"), value)?;
    }
    Ok(())
}

fn validate_zone(name: &str, zone: &ZoneDef) -> Result<(), ValidationError> {
    // An empty circuit list is allowed here; the runtime skips that zone.
    for circuit in &zone.circuits {
        check_point(circuit, format!("zones.{name}.circuits"))?;
    }
    if let Some(sensor) = &zone.temp_sensor {
        check_point(sensor, format!("zones.{name}.temp_sensor"))?;
    }

    check_finite(&format!("zones.{name}.hysteresis"), zone.hysteresis)?;
    if !(0.0..=5.0).contains(&zone.hysteresis) {
        return Err(invalid(
            format!("zones.{name}.hysteresis"),
            zone.hysteresis,
            "must be within 0..=5",
        ));
    }
    check_non_negative(&format!("zones.{name}.zone_flow_weight"), zone.zone_flow_weight)?;
    check_non_negative(&format!("zones.{name}.zone_solar_weight"), zone.zone_solar_weight)?;

    if zone.control_mode == ControlMode::Pwm {
        validate_pwm(name, &zone.pwm)?;
    }
    Ok(())
}

fn validate_pwm(name: &str, pwm: &PwmDef) -> Result<(), ValidationError> {
    let field = |f: &str| format!("zones.{name}.pwm.{f}");

    if pwm.cycle_time_minutes < 1 {
        return Err(invalid(field("cycle_time_minutes"), pwm.cycle_time_minutes, "must be at least 1"));
    }
    if pwm.min_on_time_minutes < 0 {
        return Err(invalid(field("min_on_time_minutes"), pwm.min_on_time_minutes, "must be non-negative"));
    }
    if pwm.min_on_time_minutes >= pwm.cycle_time_minutes {
        return Err(invalid(
            field("min_on_time_minutes"),
            pwm.min_on_time_minutes,
            "must be shorter than the cycle",
        ));
    }
    if pwm.min_off_time_minutes < 0 {
        return Err(invalid(field("min_off_time_minutes"), pwm.min_off_time_minutes, "must be non-negative"));
    }
    if pwm.min_off_time_minutes >= pwm.cycle_time_minutes {
        return Err(invalid(
            field("min_off_time_minutes"),
            pwm.min_off_time_minutes,
            "must be shorter than the cycle",
        ));
    }
    if pwm.actuator_delay_minutes < 0 {
        return Err(invalid(
            field("actuator_delay_minutes"),
            pwm.actuator_delay_minutes,
            "must be non-negative",
        ));
    }
    check_non_negative(&field("kp"), pwm.kp)?;
    check_finite(&field("ki"), pwm.ki)?;
    Ok(())
}
