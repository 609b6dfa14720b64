//! Per-zone demand snapshots.
//!
//! Zones push a snapshot on every evaluation; the supervisor never reads
//! zone state any other way. A zone with no known target or temperature is
//! absent from the book rather than stored with placeholders.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zf_core::{ZoneId, ZoneResponse};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneDemand {
    pub target: f64,
    pub current: f64,
    pub active: bool,
    /// 0..=100; bang-bang zones report 100 or 0.
    pub duty_cycle: f64,
    pub response: ZoneResponse,
    pub flow_weight: f64,
    pub solar_weight: f64,
}

impl ZoneDemand {
    /// Signed distance from target, positive when the room is too warm.
    pub fn delta(&self) -> f64 {
        self.current - self.target
    }
}

#[derive(Debug, Clone, Default)]
pub struct DemandBook {
    zones: BTreeMap<ZoneId, ZoneDemand>,
}

impl DemandBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `demand`, or drop the zone when `None`.
    pub fn update(&mut self, zone: &ZoneId, demand: Option<ZoneDemand>) {
        match demand {
            Some(demand) => {
                self.zones.insert(zone.clone(), demand);
            }
            None => {
                self.zones.remove(zone);
            }
        }
    }

    pub fn remove(&mut self, zone: &ZoneId) -> Option<ZoneDemand> {
        self.zones.remove(zone)
    }

    pub fn get(&self, zone: &ZoneId) -> Option<&ZoneDemand> {
        self.zones.get(zone)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ZoneId, &ZoneDemand)> {
        self.zones.iter()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Zones the flow curve looks at: the active ones, or every known zone
    /// when none is active.
    pub fn relevant(&self) -> Vec<&ZoneDemand> {
        let active: Vec<&ZoneDemand> = self.zones.values().filter(|d| d.active).collect();
        if active.is_empty() {
            self.zones.values().collect()
        } else {
            active
        }
    }

    pub fn mean_delta(&self) -> Option<f64> {
        if self.zones.is_empty() {
            return None;
        }
        let sum: f64 = self.zones.values().map(ZoneDemand::delta).sum();
        Some(sum / self.zones.len() as f64)
    }
}

#[cfg(test)]
pub(crate) fn demand(target: f64, current: f64, active: bool) -> ZoneDemand {
    ZoneDemand {
        target,
        current,
        active,
        duty_cycle: if active { 100.0 } else { 0.0 },
        response: ZoneResponse::Slow,
        flow_weight: 1.0,
        solar_weight: 1.0,
    }
}
