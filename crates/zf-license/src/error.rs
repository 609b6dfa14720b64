use thiserror::Error;

pub type LicenseResult<T> = Result<T, LicenseError>;

/// Errors from key loading and token issuing.
///
/// Verification itself reports through [`crate::LicenseReason`]; these only
/// surface from the keyring constructors and the issuer.
#[derive(Error, Debug)]
pub enum LicenseError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Key '{kid}' could not be loaded: {reason}")]
    KeyLoad { kid: String, reason: String },

    #[error("Keyring is empty")]
    EmptyKeyring,

    #[error("Keyring JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
