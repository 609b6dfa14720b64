//! Heat-source supervisor for zoneflow.
//!
//! Aggregates zone demand into the global decisions shared by every zone:
//!
//! - operation mode and the sticky auto heat/cool direction
//! - flow setpoint from the weather curve or the adaptive supervisor
//! - write suppression before the setpoint leaves the process
//! - heat-pump run state with a demand-off delay
//! - observer hooks for read-out entities

pub mod adaptive;
pub mod curve;
pub mod demand;
pub mod direction;
pub mod dispatch;
pub mod error;
pub mod observer;
pub mod offset;
pub mod pump;
pub mod supervisor;

pub use adaptive::{AdaptiveSupervisor, AdaptiveTuning, FlowBreakdown};
pub use curve::CurveSettings;
pub use demand::{DemandBook, ZoneDemand};
pub use direction::{AutoDirection, DIRECTION_DEADBAND};
pub use dispatch::{FlowDispatcher, WritePolicy};
pub use error::{SupervisorError, SupervisorResult};
pub use observer::{ObserverHandle, SupervisorObserver};
pub use offset::FlowCurveOffset;
pub use pump::PumpTracker;
pub use supervisor::{
    FlowDecision, FlowInputs, ModeSource, Supervisor, SupervisorDiagnostics, SupervisorSettings,
};
