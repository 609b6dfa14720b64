//! Error types for supervisor configuration.

use thiserror::Error;

pub type SupervisorResult<T> = Result<T, SupervisorError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SupervisorError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Non-finite parameter {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },
}

impl From<zf_core::CoreError> for SupervisorError {
    fn from(err: zf_core::CoreError) -> Self {
        match err {
            zf_core::CoreError::NonFinite { what, value } => SupervisorError::NonFinite { what, value },
            _ => SupervisorError::InvalidArg {
                what: "core argument rejected",
            },
        }
    }
}
