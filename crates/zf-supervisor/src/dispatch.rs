//! Write suppression for the flow setpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zf_core::elapsed_minutes;

use crate::error::{SupervisorError, SupervisorResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WritePolicy {
    pub deadband: f64,
    pub min_interval_minutes: f64,
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self {
            deadband: 0.3,
            min_interval_minutes: 10.0,
        }
    }
}

impl WritePolicy {
    pub fn new(deadband: f64, min_interval_minutes: f64) -> SupervisorResult<Self> {
        if !deadband.is_finite() || deadband < 0.0 {
            return Err(SupervisorError::InvalidArg {
                what: "flow write deadband must be finite and >= 0",
            });
        }
        if !min_interval_minutes.is_finite() || min_interval_minutes < 0.0 {
            return Err(SupervisorError::InvalidArg {
                what: "flow write interval must be finite and >= 0",
            });
        }
        Ok(Self {
            deadband,
            min_interval_minutes,
        })
    }
}

/// Remembers the last acknowledged write.
#[derive(Debug, Clone, Default)]
pub struct FlowDispatcher {
    policy: WritePolicy,
    last: Option<(f64, DateTime<Utc>)>,
}

impl FlowDispatcher {
    pub fn new(policy: WritePolicy) -> Self {
        Self { policy, last: None }
    }

    /// A value goes out when nothing was written yet, when it moved past the
    /// deadband, or once more than the minimum interval has passed.
    pub fn should_dispatch(&self, value: f64, now: DateTime<Utc>) -> bool {
        match self.last {
            None => true,
            Some((last_value, at)) => {
                (value - last_value).abs() > self.policy.deadband
                    || elapsed_minutes(now, at) > self.policy.min_interval_minutes
            }
        }
    }

    pub fn record(&mut self, value: f64, now: DateTime<Utc>) {
        self.last = Some((value, now));
    }

    pub fn last_value(&self) -> Option<f64> {
        self.last.map(|(v, _)| v)
    }

    pub fn last_dispatch_at(&self) -> Option<DateTime<Utc>> {
        self.last.map(|(_, at)| at)
    }
}
