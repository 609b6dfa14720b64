//! Weather-compensated flow curve.
//!
//! Heating: `max target + base + max(0, 15 - outside) * slope + offset`,
//! clamped to `[15, 35]`. Cooling: `min target - (base + max(0, outside - 24)
//! * slope + offset)`, clamped to `[15, 25]`. Targets come from the active
//! zones, or all known zones when none is active.

use serde::{Deserialize, Serialize};
use zf_core::ThermalDirection;

use crate::demand::DemandBook;

pub const HEAT_FLOW_MIN: f64 = 15.0;
pub const HEAT_FLOW_MAX: f64 = 35.0;
pub const COOL_FLOW_MIN: f64 = 15.0;
pub const COOL_FLOW_MAX: f64 = 25.0;

/// Flow used when no zone is known.
pub const HEAT_FALLBACK: f64 = 30.0;
pub const COOL_FALLBACK: f64 = 20.0;

/// Outside temperature below which heating adds a weather term.
pub const HEAT_BALANCE_POINT: f64 = 15.0;
/// Outside temperature above which cooling adds a weather term.
pub const COOL_BALANCE_POINT: f64 = 24.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveSettings {
    pub heating_base_offset: f64,
    pub cooling_base_offset: f64,
    pub heating_slope: f64,
    pub cooling_slope: f64,
}

impl Default for CurveSettings {
    fn default() -> Self {
        Self {
            heating_base_offset: 3.0,
            cooling_base_offset: 2.5,
            heating_slope: 0.25,
            cooling_slope: 0.20,
        }
    }
}

impl CurveSettings {
    /// Heating weather term; zero when the outside temperature is unknown.
    pub fn heating_weather(&self, outside: Option<f64>) -> f64 {
        outside.map_or(0.0, |t| {
            (HEAT_BALANCE_POINT - t).max(0.0) * self.heating_slope.max(0.0)
        })
    }

    pub fn cooling_weather(&self, outside: Option<f64>) -> f64 {
        outside.map_or(0.0, |t| {
            (t - COOL_BALANCE_POINT).max(0.0) * self.cooling_slope.max(0.0)
        })
    }

    pub fn simple_flow(
        &self,
        book: &DemandBook,
        direction: ThermalDirection,
        outside: Option<f64>,
        flow_curve_offset: f64,
    ) -> f64 {
        let relevant = book.relevant();
        match direction {
            ThermalDirection::Heat => {
                let Some(max_target) = relevant.iter().map(|d| d.target).reduce(f64::max) else {
                    return HEAT_FALLBACK.clamp(HEAT_FLOW_MIN, HEAT_FLOW_MAX);
                };
                let offset =
                    self.heating_base_offset + self.heating_weather(outside) + flow_curve_offset;
                (max_target + offset).clamp(HEAT_FLOW_MIN, HEAT_FLOW_MAX)
            }
            ThermalDirection::Cool => {
                let Some(min_target) = relevant.iter().map(|d| d.target).reduce(f64::min) else {
                    return COOL_FALLBACK.clamp(COOL_FLOW_MIN, COOL_FLOW_MAX);
                };
                let offset =
                    self.cooling_base_offset + self.cooling_weather(outside) + flow_curve_offset;
                (min_target - offset).clamp(COOL_FLOW_MIN, COOL_FLOW_MAX)
            }
        }
    }
}
