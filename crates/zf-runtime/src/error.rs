//! Error types for the runtime layer.

use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors raised while building or reconfiguring an installation.
///
/// Failures during zone evaluation are logged and absorbed where they
/// happen; they never surface as a `RuntimeError`.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Unknown zone: {0}")]
    UnknownZone(String),

    #[error("Zone {zone}: {source}")]
    ZoneConfig {
        zone: String,
        source: zf_controls::ControlError,
    },

    #[error("Project error: {0}")]
    Project(#[from] zf_project::ProjectError),

    #[error("Validation error: {0}")]
    Validation(#[from] zf_project::ValidationError),

    #[error("Supervisor error: {0}")]
    Supervisor(#[from] zf_supervisor::SupervisorError),

    #[error("Core error: {0}")]
    Core(#[from] zf_core::CoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
