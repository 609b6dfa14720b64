use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of a license check. Everything except `Ok` disables Pro features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseReason {
    Ok,
    MissingToken,
    MalformedToken,
    UnsupportedAlg,
    InvalidKid,
    UnknownKid,
    InvalidSignature,
    InvalidIssuer,
    InvalidSubject,
    InvalidSource,
    InvalidTier,
    TokenExpired,
    TokenNotYetValid,
    TokenIssuedInFuture,
    PublicKeyLoadFailed,
}

impl LicenseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            LicenseReason::Ok => "ok",
            LicenseReason::MissingToken => "missing_token",
            LicenseReason::MalformedToken => "malformed_token",
            LicenseReason::UnsupportedAlg => "unsupported_alg",
            LicenseReason::InvalidKid => "invalid_kid",
            LicenseReason::UnknownKid => "unknown_kid",
            LicenseReason::InvalidSignature => "invalid_signature",
            LicenseReason::InvalidIssuer => "invalid_issuer",
            LicenseReason::InvalidSubject => "invalid_subject",
            LicenseReason::InvalidSource => "invalid_source",
            LicenseReason::InvalidTier => "invalid_tier",
            LicenseReason::TokenExpired => "token_expired",
            LicenseReason::TokenNotYetValid => "token_not_yet_valid",
            LicenseReason::TokenIssuedInFuture => "token_issued_in_future",
            LicenseReason::PublicKeyLoadFailed => "public_key_load_failed",
        }
    }

    pub fn is_ok(self) -> bool {
        self == LicenseReason::Ok
    }
}

impl fmt::Display for LicenseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
