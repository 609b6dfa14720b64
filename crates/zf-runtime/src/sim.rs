//! Offline simulation against [`InMemoryGateway`].
//!
//! Every zone is modelled as one first-order thermal mass: it loses heat
//! toward the outside air and, while any of its circuits is on, moves
//! toward the supply temperature.

use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use zf_core::{ZoneId, ensure_finite};
use zf_project::InstallationDef;

use crate::error::{RuntimeError, RuntimeResult};
use crate::gateway::{Gateway, InMemoryGateway};
use crate::installation::Installation;

/// Supply temperature assumed before the first flow setpoint exists.
const FALLBACK_SUPPLY_C: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoomModel {
    /// Time constant of losses to outside (minutes).
    pub loss_tau_minutes: f64,
    /// Time constant toward supply temperature while circuits run (minutes).
    pub emitter_tau_minutes: f64,
}

impl Default for RoomModel {
    fn default() -> Self {
        Self {
            loss_tau_minutes: 600.0,
            emitter_tau_minutes: 120.0,
        }
    }
}

impl RoomModel {
    pub fn new(loss_tau_minutes: f64, emitter_tau_minutes: f64) -> RuntimeResult<Self> {
        if !(loss_tau_minutes.is_finite() && loss_tau_minutes > 0.0) {
            return Err(RuntimeError::InvalidArg {
                what: "loss_tau_minutes must be positive",
            });
        }
        if !(emitter_tau_minutes.is_finite() && emitter_tau_minutes > 0.0) {
            return Err(RuntimeError::InvalidArg {
                what: "emitter_tau_minutes must be positive",
            });
        }
        Ok(Self {
            loss_tau_minutes,
            emitter_tau_minutes,
        })
    }

    /// Temperature derivative in °C per minute.
    pub fn dtdt(&self, room: f64, outside: f64, supply: Option<f64>) -> f64 {
        let loss = (outside - room) / self.loss_tau_minutes;
        let gain = supply.map_or(0.0, |s| (s - room) / self.emitter_tau_minutes);
        loss + gain
    }

    /// Explicit Euler step of `dt_minutes`.
    pub fn step(&self, room: f64, outside: f64, supply: Option<f64>, dt_minutes: f64) -> f64 {
        room + self.dtdt(room, outside, supply) * dt_minutes
    }
}

#[derive(Debug, Clone)]
struct SimRoom {
    sensor: Option<String>,
    circuits: Vec<String>,
    temperature: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSample {
    pub temperature: f64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSample {
    pub at: DateTime<Utc>,
    pub zones: BTreeMap<ZoneId, ZoneSample>,
    pub flow: Option<f64>,
    pub dispatched_flow: Option<f64>,
}

pub struct Simulation {
    installation: Rc<Installation<InMemoryGateway>>,
    gateway: Rc<InMemoryGateway>,
    rooms: BTreeMap<ZoneId, SimRoom>,
    outside_point: String,
    outside: f64,
    model: RoomModel,
}

impl Simulation {
    /// Seed a gateway with `start_temp` in every room and `outside` at the
    /// outdoor sensor, then build the installation on top of it.
    pub fn new(
        def: InstallationDef,
        start: DateTime<Utc>,
        outside: f64,
        start_temp: f64,
        model: RoomModel,
    ) -> RuntimeResult<Self> {
        let outside = ensure_finite(outside, "outside temperature")?;
        let start_temp = ensure_finite(start_temp, "start temperature")?;
        let gateway = Rc::new(InMemoryGateway::new(start));
        gateway.set_value(&def.outside_temp_sensor, outside);

        let mut rooms = BTreeMap::new();
        for (name, zone) in &def.zones {
            if let Some(sensor) = &zone.temp_sensor {
                gateway.set_value(sensor, start_temp);
            }
            for circuit in &zone.circuits {
                gateway.set_state(circuit, "off");
            }
            rooms.insert(
                ZoneId::from_name(name),
                SimRoom {
                    sensor: zone.temp_sensor.clone(),
                    circuits: zone.circuits.clone(),
                    temperature: start_temp,
                },
            );
        }
        let outside_point = def.outside_temp_sensor.clone();
        let installation = Rc::new(Installation::new(def, Rc::clone(&gateway))?);
        rooms.retain(|id, _| installation.zone(id).is_some());

        Ok(Self {
            installation,
            gateway,
            rooms,
            outside_point,
            outside,
            model,
        })
    }

    pub fn installation(&self) -> &Rc<Installation<InMemoryGateway>> {
        &self.installation
    }

    pub fn gateway(&self) -> &Rc<InMemoryGateway> {
        &self.gateway
    }

    pub fn set_outside(&mut self, outside: f64) {
        self.outside = outside;
        self.gateway.set_value(&self.outside_point, outside);
    }

    fn supply(&self) -> f64 {
        self.installation
            .diagnostics()
            .supervisor
            .display_flow
            .unwrap_or(FALLBACK_SUPPLY_C)
    }

    /// Advance physics and the clock by `dt_minutes`, then tick the installation.
    pub async fn step(&mut self, dt_minutes: i64) {
        let supply = self.supply();
        for room in self.rooms.values_mut() {
            let heating = room.circuits.iter().any(|c| self.gateway.is_on(c));
            room.temperature =
                self.model
                    .step(room.temperature, self.outside, heating.then_some(supply), dt_minutes as f64);
            if let Some(sensor) = &room.sensor {
                self.gateway.set_value(sensor, room.temperature);
            }
        }
        self.gateway.advance(Duration::minutes(dt_minutes));
        self.installation.tick().await;
    }

    pub fn sample(&self) -> SimulationSample {
        let diagnostics = self.installation.diagnostics();
        let zones = self
            .rooms
            .iter()
            .map(|(id, room)| {
                let active = room.circuits.iter().any(|c| self.gateway.is_on(c));
                (
                    id.clone(),
                    ZoneSample {
                        temperature: room.temperature,
                        active,
                    },
                )
            })
            .collect();
        SimulationSample {
            at: self.gateway.now(),
            zones,
            flow: diagnostics.supervisor.display_flow,
            dispatched_flow: diagnostics.supervisor.last_dispatched_flow,
        }
    }

    /// Run for `hours` in one-minute steps, sampling every `sample_minutes`.
    /// The first sample is taken after the initial evaluation.
    pub async fn run(&mut self, hours: f64, sample_minutes: i64) -> RuntimeResult<Vec<SimulationSample>> {
        let hours = ensure_finite(hours, "simulation hours")?;
        if hours < 0.0 {
            return Err(RuntimeError::InvalidArg {
                what: "simulation hours must be non-negative",
            });
        }
        if sample_minutes < 1 {
            return Err(RuntimeError::InvalidArg {
                what: "sample interval must be at least one minute",
            });
        }
        let total = (hours * 60.0).round() as i64;

        self.installation.tick().await;
        let mut samples = vec![self.sample()];
        for minute in 1..=total {
            self.step(1).await;
            if minute % sample_minutes == 0 {
                samples.push(self.sample());
            }
        }
        Ok(samples)
    }
}
