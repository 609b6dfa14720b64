//! Adaptive heating flow supervisor.
//!
//! Builds one demand index from every known zone and turns it into a flow
//! setpoint on top of the weather curve:
//!
//! - per-zone score: normalised error blended with an exponentially smoothed
//!   duty fraction
//! - slow and fast zones are averaged separately (by flow weight) and mixed
//! - proportional trim, optional integral trim, a fast-zone boost and an
//!   optional forecast preheat boost are added
//! - the result is slew-limited against the previous output, then clamped
//!   to `[15, 35]`
//!
//! Every intermediate is returned as a [`FlowBreakdown`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zf_core::{ZoneId, ZoneResponse, elapsed_seconds, normalize_pair, round_to, weighted_average};

use crate::curve::{CurveSettings, HEAT_FALLBACK, HEAT_FLOW_MAX, HEAT_FLOW_MIN};
use crate::demand::DemandBook;
use crate::supervisor::FlowInputs;

/// Slew rates are configured per this many seconds.
const SLEW_WINDOW_SECONDS: f64 = 300.0;
/// Floor on a zone's score when it weights the solar factor.
const SOLAR_SCORE_FLOOR: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveTuning {
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

impl Default for AdaptiveTuning {
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

/// Intermediates of one adaptive evaluation, rounded for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowBreakdown {
    pub target_ref_c: Option<f64>,
    pub di_slow: f64,
    pub di_fast: f64,
    pub slow_mix_weight: f64,
    pub fast_mix_weight: f64,
    pub demand_index: f64,
    pub weather_term_c: Option<f64>,
    pub kp: f64,
    pub trim_p_c: f64,
    pub integral_enabled: bool,
    pub integral_c: f64,
    pub fast_boost_c: f64,
    pub preheat_boost_c: f64,
    pub flow_temp_unclamped_c: f64,
    pub flow_temp_smoothed_c: f64,
    pub flow_temp_c: f64,
    pub clamp_min_c: f64,
    pub clamp_max_c: f64,
}

impl FlowBreakdown {
    fn idle() -> Self {
        Self {
            target_ref_c: None,
            di_slow: 0.0,
            di_fast: 0.0,
            slow_mix_weight: 0.0,
            fast_mix_weight: 0.0,
            demand_index: 0.0,
            weather_term_c: None,
            kp: 0.0,
            trim_p_c: 0.0,
            integral_enabled: false,
            integral_c: 0.0,
            fast_boost_c: 0.0,
            preheat_boost_c: 0.0,
            flow_temp_unclamped_c: HEAT_FALLBACK,
            flow_temp_smoothed_c: HEAT_FALLBACK,
            flow_temp_c: HEAT_FALLBACK,
            clamp_min_c: HEAT_FLOW_MIN,
            clamp_max_c: HEAT_FLOW_MAX,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ScoredZone {
    target: f64,
    error: f64,
    duty: f64,
    response: ZoneResponse,
    weight: f64,
    solar_weight: f64,
    score: f64,
}

/// Adaptive state: duty averages, integral, and the last smoothed output.
#[derive(Debug, Clone)]
pub struct AdaptiveSupervisor {
    ema_duty: BTreeMap<ZoneId, f64>,
    integral: f64,
    last_eval: Option<DateTime<Utc>>,
    last_flow: f64,
}

impl Default for AdaptiveSupervisor {
    fn default() -> Self {
        Self {
            ema_duty: BTreeMap::new(),
            integral: 0.0,
            last_eval: None,
            last_flow: HEAT_FALLBACK,
        }
    }
}

impl AdaptiveSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn smoothed_duty(&self, zone: &ZoneId) -> Option<f64> {
        self.ema_duty.get(zone).copied()
    }

    fn dt_minutes(&self, now: DateTime<Utc>) -> f64 {
        match self.last_eval {
            Some(last) => elapsed_seconds(now, last).max(1.0) / 60.0,
            None => 1.0,
        }
    }

    fn smooth_duty(&mut self, zone: &ZoneId, raw: f64, dt_minutes: f64, tau_minutes: f64) -> f64 {
        let filtered = match self.ema_duty.get(zone) {
            None => raw,
            Some(&previous) => {
                let alpha = 1.0 - (-dt_minutes / tau_minutes.max(1e-6)).exp();
                previous + alpha * (raw - previous)
            }
        };
        self.ema_duty.insert(zone.clone(), filtered);
        filtered
    }

    fn score_zones(&mut self, book: &DemandBook, dt_minutes: f64, tuning: &AdaptiveTuning) -> Vec<ScoredZone> {
        let error_norm_max = tuning.error_norm_max.max(0.1);
        let tau = tuning.duty_ema_minutes.max(1.0);
        let (error_weight, duty_weight) = normalize_pair(tuning.error_weight, tuning.duty_weight);

        let mut scored = Vec::with_capacity(book.len());
        for (zone, demand) in book.iter() {
            let error = (demand.target - demand.current).max(0.0);
            let normalized_error = (error / error_norm_max).clamp(0.0, 1.0);
            let raw_duty = demand.duty_cycle.clamp(0.0, 100.0);
            let duty = self.smooth_duty(zone, raw_duty, dt_minutes, tau) / 100.0;
            scored.push(ScoredZone {
                target: demand.target,
                error,
                duty,
                response: demand.response,
                weight: demand.flow_weight.max(0.0),
                solar_weight: demand.solar_weight.max(0.0),
                score: error_weight * normalized_error + duty_weight * duty,
            });
        }
        scored
    }

    fn slew_limit(&self, raw: f64, now: DateTime<Utc>, tuning: &AdaptiveTuning) -> f64 {
        let Some(last) = self.last_eval else {
            return raw;
        };
        let dt_seconds = elapsed_seconds(now, last).max(1.0);
        let max_up = tuning.slew_up_c_per_5m.max(0.0) / SLEW_WINDOW_SECONDS * dt_seconds;
        let max_down = tuning.slew_down_c_per_5m.max(0.0) / SLEW_WINDOW_SECONDS * dt_seconds;
        raw.clamp(self.last_flow - max_down, self.last_flow + max_up)
    }

    /// Heating flow for the current demand book.
    pub fn compute(
        &mut self,
        book: &DemandBook,
        inputs: &FlowInputs,
        curve: &CurveSettings,
        flow_curve_offset: f64,
        tuning: &AdaptiveTuning,
        now: DateTime<Utc>,
    ) -> (f64, FlowBreakdown) {
        let dt_minutes = self.dt_minutes(now);
        let zones = self.score_zones(book, dt_minutes, tuning);
        if zones.is_empty() {
            self.last_eval = Some(now);
            return (HEAT_FALLBACK, FlowBreakdown::idle());
        }

        let fast: Vec<ScoredZone> = zones
            .iter()
            .copied()
            .filter(|z| z.response == ZoneResponse::Fast)
            .collect();
        let mut slow: Vec<ScoredZone> = zones
            .iter()
            .copied()
            .filter(|z| z.response == ZoneResponse::Slow)
            .collect();
        if slow.is_empty() {
            slow = zones.clone();
        }

        let target_ref = slow.iter().map(|z| z.target).fold(f64::NEG_INFINITY, f64::max);
        let di_slow = weighted_average(slow.iter().map(|z| (z.score, z.weight)));
        let di_fast = if fast.is_empty() {
            di_slow
        } else {
            weighted_average(fast.iter().map(|z| (z.score, z.weight)))
        };

        let (slow_mix, fast_mix) = normalize_pair(tuning.slow_mix_weight, tuning.fast_mix_weight);
        let demand_index = slow_mix * di_slow + fast_mix * di_fast;

        let weather_term =
            curve.heating_base_offset + flow_curve_offset + curve.heating_weather(inputs.outside);
        let base_flow = target_ref + weather_term;

        let kp = tuning.kp.max(0.0);
        let trim_p = kp * demand_index;
        let mut trim = trim_p;

        if tuning.use_integral {
            let ti = tuning.ti_minutes.max(1.0);
            let i_max = tuning.i_max.max(0.0);
            self.integral = (self.integral + demand_index * (dt_minutes / ti)).clamp(0.0, i_max);
            trim += self.integral;
        } else {
            self.integral = 0.0;
        }

        let fast_boost = fast_zone_boost(&fast, tuning);
        let preheat_boost = preheat_boost(inputs, &slow, di_slow, tuning);

        let raw_flow = base_flow + trim + fast_boost + preheat_boost;
        let smoothed = self.slew_limit(raw_flow, now, tuning);
        self.last_eval = Some(now);
        self.last_flow = smoothed;

        let flow = smoothed.clamp(HEAT_FLOW_MIN, HEAT_FLOW_MAX);
        let breakdown = FlowBreakdown {
            target_ref_c: Some(round_to(target_ref, 3)),
            di_slow: round_to(di_slow, 6),
            di_fast: round_to(di_fast, 6),
            slow_mix_weight: round_to(slow_mix, 6),
            fast_mix_weight: round_to(fast_mix, 6),
            demand_index: round_to(demand_index, 6),
            weather_term_c: Some(round_to(weather_term, 3)),
            kp: round_to(kp, 6),
            trim_p_c: round_to(trim_p, 3),
            integral_enabled: tuning.use_integral,
            integral_c: if tuning.use_integral {
                round_to(self.integral, 6)
            } else {
                0.0
            },
            fast_boost_c: round_to(fast_boost, 3),
            preheat_boost_c: round_to(preheat_boost, 3),
            flow_temp_unclamped_c: round_to(raw_flow, 3),
            flow_temp_smoothed_c: round_to(smoothed, 3),
            flow_temp_c: round_to(flow, 1),
            clamp_min_c: HEAT_FLOW_MIN,
            clamp_max_c: HEAT_FLOW_MAX,
        };
        tracing::debug!(
            flow,
            demand_index,
            fast_boost,
            preheat_boost,
            "adaptive heating flow"
        );
        (flow, breakdown)
    }
}

/// Largest duty- and weight-scaled error above the deadband among fast zones.
fn fast_zone_boost(fast: &[ScoredZone], tuning: &AdaptiveTuning) -> f64 {
    let deadband = tuning.fast_error_deadband_c.max(0.0);
    let worst = fast
        .iter()
        .map(|z| (z.error - deadband).max(0.0) * z.duty * z.weight)
        .reduce(f64::max);
    match worst {
        Some(excess) => (excess * tuning.fast_boost_gain.max(0.0))
            .clamp(0.0, tuning.fast_boost_cap_c.max(0.0)),
        None => 0.0,
    }
}

/// Boost ahead of a forecast cold drop, softened by forecast sunshine.
///
/// The final value is clamped to `[0, cap]`, so a sunny forecast can cancel
/// the boost but never lower the flow below the unboosted value.
fn preheat_boost(
    inputs: &FlowInputs,
    slow: &[ScoredZone],
    di_slow: f64,
    tuning: &AdaptiveTuning,
) -> f64 {
    if !tuning.preheat_enabled {
        return 0.0;
    }
    let (Some(outside), Some(forecast)) = (inputs.outside, inputs.forecast_outside) else {
        return 0.0;
    };
    if di_slow < tuning.preheat_min_slow_di.max(0.0) {
        return 0.0;
    }

    let cold_preheat = (outside - forecast).max(0.0) * tuning.preheat_gain.max(0.0);

    let solar_softening = match inputs.forecast_solar {
        Some(irradiance) => {
            let zone_solar_factor = weighted_average(
                slow.iter()
                    .map(|z| (z.solar_weight, (z.weight * z.score.max(SOLAR_SCORE_FLOOR)).max(0.0))),
            );
            irradiance.max(0.0) * tuning.preheat_solar_gain_per_w_m2.max(0.0) * zone_solar_factor
        }
        None => 0.0,
    };

    (cold_preheat - solar_softening).clamp(0.0, tuning.preheat_cap_c.max(0.0))
}
