//! Duty-cycle engine and PWM scheduling primitives for zoneflow.
//!
//! This crate holds the pure control computations a zone runs every
//! evaluation. Nothing in here talks to a gateway or owns a clock: callers
//! pass `now` and the previous state in, and get the next state back.
//!
//! # Architecture
//!
//! - **Bang-bang**: hysteresis latch around the target, inverted for cooling
//! - **PI duty**: error -> duty percentage with integral anti-windup
//! - **On-time**: duty -> minutes on within a cycle, honouring minimum
//!   on/off times and actuator travel delay
//! - **Schedule**: wall-clock aligned cycle starts, staggered per zone

pub mod bang_bang;
pub mod controller;
pub mod error;
pub mod pwm;
pub mod schedule;

pub use bang_bang::{BangBang, SwitchDecision};
pub use controller::{DutyController, DutyOutput, PiState};
pub use error::{ControlError, ControlResult};
pub use pwm::{PwmTiming, should_be_on};
pub use schedule::{CycleClock, aligned_cycle_start, phase_offset_seconds};
