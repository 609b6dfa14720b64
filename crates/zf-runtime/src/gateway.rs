//! Host capability surface.
//!
//! The control core never talks to the host directly. Everything it needs
//! (sensor values, actuator commands, numeric writes and the clock) goes
//! through [`Gateway`]. Subscriptions stay with the host, which calls back
//! into the installation.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use zf_core::{ActuatorPoint, PointId};

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Point not found: {point}")]
    NotFound { point: String },

    #[error("Point unavailable: {point}")]
    Unavailable { point: String },

    #[error("Point {point} has non-numeric state '{state}'")]
    NotNumeric { point: String, state: String },

    #[error("Command rejected for {point}: {reason}")]
    Rejected { point: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

#[async_trait(?Send)]
pub trait Gateway {
    /// Numeric state of a sensor.
    async fn read_sensor(&self, point: &PointId) -> GatewayResult<f64>;

    /// Raw string state, used for the external mode sensor.
    async fn read_text(&self, point: &PointId) -> GatewayResult<String>;

    /// Whether an actuator currently reports `on`.
    async fn read_actuator(&self, point: &PointId) -> GatewayResult<bool>;

    async fn command_actuator(&self, point: &ActuatorPoint, on: bool) -> GatewayResult<()>;

    async fn write_numeric(&self, point: &PointId, value: f64) -> GatewayResult<()>;

    fn now(&self) -> DateTime<Utc>;
}

/// A command observed by [`InMemoryGateway`].
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCommand {
    Actuator { point: String, on: bool },
    Numeric { point: String, value: f64 },
}

/// Gateway over an in-process state table with a manual clock.
///
/// Used by the simulator and by tests. States are stored as strings the
/// way a home automation host reports them; `unknown` and `unavailable`
/// read as [`GatewayError::Unavailable`].
#[derive(Debug)]
pub struct InMemoryGateway {
    states: RefCell<BTreeMap<String, String>>,
    rejected: RefCell<BTreeSet<String>>,
    commands: RefCell<Vec<GatewayCommand>>,
    now: RefCell<DateTime<Utc>>,
}

impl InMemoryGateway {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            states: RefCell::new(BTreeMap::new()),
            rejected: RefCell::new(BTreeSet::new()),
            commands: RefCell::new(Vec::new()),
            now: RefCell::new(start),
        }
    }

    pub fn set_state(&self, point: &str, state: impl Into<String>) {
        self.states.borrow_mut().insert(point.to_string(), state.into());
    }

    pub fn set_value(&self, point: &str, value: f64) {
        self.set_state(point, value.to_string());
    }

    pub fn remove_state(&self, point: &str) {
        self.states.borrow_mut().remove(point);
    }

    pub fn state(&self, point: &str) -> Option<String> {
        self.states.borrow().get(point).cloned()
    }

    pub fn is_on(&self, point: &str) -> bool {
        self.state(point).as_deref() == Some("on")
    }

    pub fn value(&self, point: &str) -> Option<f64> {
        self.state(point).and_then(|s| s.parse().ok())
    }

    /// Make every command to `point` fail with [`GatewayError::Rejected`].
    pub fn reject(&self, point: &str) {
        self.rejected.borrow_mut().insert(point.to_string());
    }

    pub fn accept(&self, point: &str) {
        self.rejected.borrow_mut().remove(point);
    }

    pub fn commands(&self) -> Vec<GatewayCommand> {
        self.commands.borrow().clone()
    }

    pub fn take_commands(&self) -> Vec<GatewayCommand> {
        std::mem::take(&mut *self.commands.borrow_mut())
    }

    /// Values written to `point`, oldest first.
    pub fn numeric_writes(&self, point: &str) -> Vec<f64> {
        self.commands
            .borrow()
            .iter()
            .filter_map(|c| match c {
                GatewayCommand::Numeric { point: p, value } if p == point => Some(*value),
                _ => None,
            })
            .collect()
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        *self.now.borrow_mut() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.borrow_mut();
        *now += by;
    }

    fn raw(&self, point: &PointId) -> GatewayResult<String> {
        let state = self
            .states
            .borrow()
            .get(point.as_str())
            .cloned()
            .ok_or_else(|| GatewayError::NotFound {
                point: point.to_string(),
            })?;
        match state.as_str() {
            "unknown" | "unavailable" => Err(GatewayError::Unavailable {
                point: point.to_string(),
            }),
            _ => Ok(state),
        }
    }

    fn check_accepted(&self, point: &str) -> GatewayResult<()> {
        if self.rejected.borrow().contains(point) {
            return Err(GatewayError::Rejected {
                point: point.to_string(),
                reason: "rejected by host".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl Gateway for InMemoryGateway {
    async fn read_sensor(&self, point: &PointId) -> GatewayResult<f64> {
        let state = self.raw(point)?;
        match state.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(GatewayError::NotNumeric {
                point: point.to_string(),
                state,
            }),
        }
    }

    async fn read_text(&self, point: &PointId) -> GatewayResult<String> {
        self.raw(point)
    }

    async fn read_actuator(&self, point: &PointId) -> GatewayResult<bool> {
        Ok(self.raw(point)? == "on")
    }

    async fn command_actuator(&self, point: &ActuatorPoint, on: bool) -> GatewayResult<()> {
        let name = point.point.as_str();
        self.check_accepted(name)?;
        self.set_state(name, if on { "on" } else { "off" });
        self.commands.borrow_mut().push(GatewayCommand::Actuator {
            point: name.to_string(),
            on,
        });
        Ok(())
    }

    async fn write_numeric(&self, point: &PointId, value: f64) -> GatewayResult<()> {
        self.check_accepted(point.as_str())?;
        self.set_value(point.as_str(), value);
        self.commands.borrow_mut().push(GatewayCommand::Numeric {
            point: point.to_string(),
            value,
        });
        Ok(())
    }

    fn now(&self) -> DateTime<Utc> {
        *self.now.borrow()
    }
}
