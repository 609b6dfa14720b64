//! zf-runtime: the running control core.
//!
//! Wires the supervisor, per-zone controllers and the host [`Gateway`] into
//! an [`Installation`]. The host forwards state changes and timer ticks; the
//! installation reads what it needs, drives circuits and writes the flow
//! setpoint back through the gateway.
//!
//! Contains:
//! - gateway (host capability trait + in-memory implementation)
//! - zone (per-zone controller, persistence and diagnostics)
//! - latch (single-flight evaluation latch)
//! - settings (configuration compilation and licence gating)
//! - installation (evaluation queue and heat-source dispatch)
//! - driver (periodic timer)
//! - sim (first-order room simulation)

pub mod driver;
pub mod error;
pub mod gateway;
pub mod installation;
pub mod latch;
pub mod settings;
pub mod sim;
pub mod zone;

pub use driver::{DEFAULT_TICK_PERIOD, run_timer};
pub use error::{RuntimeError, RuntimeResult};
pub use gateway::{Gateway, GatewayCommand, GatewayError, GatewayResult, InMemoryGateway};
pub use installation::{Installation, InstallationDiagnostics, PersistedState};
pub use latch::EvalLatch;
pub use settings::HeatSourcePoints;
pub use sim::{RoomModel, Simulation, SimulationSample, ZoneSample};
pub use zone::{
    DEFAULT_TARGET, PersistedZoneState, PwmState, TARGET_MAX, TARGET_MIN, ZoneConfig, ZoneControl,
    ZoneController, ZoneDiagnostics,
};
