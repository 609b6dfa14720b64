//! Error types for control computations.

use thiserror::Error;

/// Result type for control operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors raised while building controller parameters.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// Invalid argument provided to a control function.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// A parameter was NaN or infinite.
    #[error("Non-finite parameter {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },
}

impl From<zf_core::CoreError> for ControlError {
    fn from(err: zf_core::CoreError) -> Self {
        match err {
            zf_core::CoreError::NonFinite { what, value } => ControlError::NonFinite { what, value },
            _ => ControlError::InvalidArg {
                what: "core argument rejected",
            },
        }
    }
}
