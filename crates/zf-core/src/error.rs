use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Malformed point id '{point}': {reason}")]
    MalformedPoint { point: String, reason: &'static str },

    #[error("Unsupported actuator namespace '{domain}' for point '{point}'")]
    UnsupportedActuator { point: String, domain: String },
}
