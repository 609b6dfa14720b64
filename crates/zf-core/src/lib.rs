//! zf-core: shared vocabulary for zoneflow.
//!
//! Contains:
//! - ids (zone ids, point ids, actuator namespaces)
//! - modes (thermal direction, operation/manual modes, HVAC action, pump state)
//! - numeric (Real + float helpers)
//! - time (wall-clock helpers shared by controllers and the supervisor)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod modes;
pub mod numeric;
pub mod time;

// Re-exports: nice ergonomics for downstream crates
pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use modes::*;
pub use numeric::*;
pub use time::*;
