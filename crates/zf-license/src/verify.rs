//! Token verification.
//!
//! Checks run in a fixed order and the first failure is reported:
//! presence, shape, algorithm, kid, keyring, signature, issuer, subject,
//! source, tier, then the `exp`/`nbf`/`iat` window.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::keyring::Keyring;
use crate::reason::LicenseReason;
use crate::token;

pub const ALLOWED_ISSUERS: &[&str] = &["zoneflow", "license.zoneflow.dev"];
pub const ALLOWED_SOURCES: &[&str] = &["github_sponsors", "ghs"];
pub const ALLOWED_TIERS: &[&str] = &["pro", "sponsor"];

/// Result of validating the configured license once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseStatus {
    pub pro_enabled: bool,
    pub reason: LicenseReason,
}

impl LicenseStatus {
    pub fn from_reason(reason: LicenseReason) -> Self {
        Self {
            pro_enabled: reason.is_ok(),
            reason,
        }
    }

    pub fn free(reason: LicenseReason) -> Self {
        Self {
            pro_enabled: false,
            reason,
        }
    }
}

/// Turns the configured token into a [`LicenseStatus`].
///
/// Called once per (re)configuration, never per control cycle.
pub trait LicenseVerifier {
    fn verify(&self, token: Option<&str>, now: DateTime<Utc>) -> LicenseStatus;
}

/// Ed25519 verifier over a keyring loaded at construction.
#[derive(Debug, Clone)]
pub struct Ed25519Verifier {
    keyring: Option<Keyring>,
}

impl Ed25519Verifier {
    pub fn new(keyring: Keyring) -> Self {
        Self {
            keyring: Some(keyring),
        }
    }

    /// Load from the configured key map or the environment. A load failure
    /// is kept and reported as `public_key_load_failed` on verification.
    pub fn from_sources(configured: Option<&BTreeMap<String, String>>) -> Self {
        match Keyring::load(configured) {
            Ok(ring) => Self::new(ring),
            Err(err) => {
                tracing::debug!(error = %err, "license keyring unavailable");
                Self { keyring: None }
            }
        }
    }
}

impl LicenseVerifier for Ed25519Verifier {
    fn verify(&self, token: Option<&str>, now: DateTime<Utc>) -> LicenseStatus {
        LicenseStatus::from_reason(verify_token(token, self.keyring.as_ref(), now))
    }
}

fn allowed(value: Option<&Value>, list: &[&str]) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|v| list.contains(&v))
}

fn check_time_window(payload: &Map<String, Value>, now: i64) -> LicenseReason {
    match payload.get("exp").and_then(Value::as_i64) {
        Some(exp) if exp > now => {}
        _ => return LicenseReason::TokenExpired,
    }
    // A null claim counts as absent.
    match payload.get("nbf") {
        None | Some(Value::Null) => {}
        Some(nbf) => match nbf.as_i64() {
            Some(nbf) if nbf <= now => {}
            _ => return LicenseReason::TokenNotYetValid,
        },
    }
    match payload.get("iat") {
        None | Some(Value::Null) => {}
        Some(iat) => match iat.as_i64() {
            Some(iat) if iat <= now => {}
            _ => return LicenseReason::TokenIssuedInFuture,
        },
    }
    LicenseReason::Ok
}

/// Validate `raw` against `keyring` at `now`.
pub fn verify_token(
    raw: Option<&str>,
    keyring: Option<&Keyring>,
    now: DateTime<Utc>,
) -> LicenseReason {
    let normalized = raw.map(token::normalize).unwrap_or_default();
    if normalized.is_empty() {
        return LicenseReason::MissingToken;
    }

    let Some(decoded) = token::decode(&normalized) else {
        return LicenseReason::MalformedToken;
    };

    if decoded.header.get("alg").and_then(Value::as_str) != Some("EdDSA") {
        return LicenseReason::UnsupportedAlg;
    }

    let kid = match decoded.header.get("kid") {
        None | Some(Value::Null) => None,
        Some(Value::String(kid)) if !kid.trim().is_empty() => Some(kid.as_str()),
        Some(_) => return LicenseReason::InvalidKid,
    };

    let Some(keyring) = keyring.filter(|ring| !ring.is_empty()) else {
        return LicenseReason::PublicKeyLoadFailed;
    };
    let Some(public_key) = keyring.resolve(kid) else {
        return LicenseReason::UnknownKid;
    };

    let Ok(signature) = Signature::from_slice(&decoded.signature) else {
        return LicenseReason::InvalidSignature;
    };
    if public_key
        .verify(decoded.signing_input.as_bytes(), &signature)
        .is_err()
    {
        return LicenseReason::InvalidSignature;
    }

    let payload = &decoded.payload;
    if !allowed(payload.get("iss"), ALLOWED_ISSUERS) {
        return LicenseReason::InvalidIssuer;
    }
    let subject_ok = payload
        .get("sub")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty());
    if !subject_ok {
        return LicenseReason::InvalidSubject;
    }
    if !allowed(payload.get("src"), ALLOWED_SOURCES) {
        return LicenseReason::InvalidSource;
    }
    if !allowed(payload.get("tier"), ALLOWED_TIERS) {
        return LicenseReason::InvalidTier;
    }

    check_time_window(payload, now.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn time_window_edges() {
        let t = now().timestamp();
        let window = |v: Value| check_time_window(v.as_object().unwrap(), t);

        assert_eq!(window(json!({ "exp": t + 1 })), LicenseReason::Ok);
        assert_eq!(window(json!({ "exp": t })), LicenseReason::TokenExpired);
        assert_eq!(window(json!({ "exp": (t + 100) as f64 + 0.5 })), LicenseReason::TokenExpired);
        assert_eq!(window(json!({})), LicenseReason::TokenExpired);
        assert_eq!(window(json!({ "exp": t + 10, "nbf": t })), LicenseReason::Ok);
        assert_eq!(
            window(json!({ "exp": t + 10, "nbf": t + 1 })),
            LicenseReason::TokenNotYetValid
        );
        assert_eq!(
            window(json!({ "exp": t + 10, "nbf": "soon" })),
            LicenseReason::TokenNotYetValid
        );
        assert_eq!(
            window(json!({ "exp": t + 10, "iat": t + 5 })),
            LicenseReason::TokenIssuedInFuture
        );
    }

    #[test]
    fn null_time_claims_are_skipped() {
        let t = now().timestamp();
        let window = |v: Value| check_time_window(v.as_object().unwrap(), t);

        assert_eq!(
            window(json!({ "exp": t + 10, "nbf": null, "iat": null })),
            LicenseReason::Ok
        );
        assert_eq!(
            window(json!({ "exp": t + 10, "nbf": null, "iat": t + 5 })),
            LicenseReason::TokenIssuedInFuture
        );
        assert_eq!(window(json!({ "exp": null })), LicenseReason::TokenExpired);
    }

    #[test]
    fn missing_and_malformed() {
        assert_eq!(verify_token(None, None, now()), LicenseReason::MissingToken);
        assert_eq!(verify_token(Some("   "), None, now()), LicenseReason::MissingToken);
        assert_eq!(verify_token(Some("legacy-code"), None, now()), LicenseReason::MalformedToken);
        assert_eq!(verify_token(Some("a.b.c"), None, now()), LicenseReason::MalformedToken);
    }

    #[test]
    fn header_checks_precede_key_loading() {
        let header = token::encode_segment(br#"{"alg":"HS256"}"#);
        let body = token::encode_segment(b"{}");
        let raw = format!("{header}.{body}.{}", token::encode_segment(b"x"));
        assert_eq!(verify_token(Some(&raw), None, now()), LicenseReason::UnsupportedAlg);

        let header = token::encode_segment(br#"{"alg":"EdDSA","kid":" "}"#);
        let raw = format!("{header}.{body}.{}", token::encode_segment(b"x"));
        assert_eq!(verify_token(Some(&raw), None, now()), LicenseReason::InvalidKid);

        let header = token::encode_segment(br#"{"alg":"EdDSA","kid":7}"#);
        let raw = format!("{header}.{body}.{}", token::encode_segment(b"x"));
        assert_eq!(verify_token(Some(&raw), None, now()), LicenseReason::InvalidKid);

        let header = token::encode_segment(br#"{"alg":"EdDSA"}"#);
        let raw = format!("{header}.{body}.{}", token::encode_segment(b"x"));
        assert_eq!(verify_token(Some(&raw), None, now()), LicenseReason::PublicKeyLoadFailed);
    }

    #[test]
    fn status_flags_follow_reason() {
        assert!(LicenseStatus::from_reason(LicenseReason::Ok).pro_enabled);
        assert!(!LicenseStatus::from_reason(LicenseReason::InvalidTier).pro_enabled);
        assert!(!LicenseStatus::free(LicenseReason::Ok).pro_enabled);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn arbitrary_input_never_enables_pro(raw in ".{0,200}") {
            let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
            let reason = verify_token(Some(&raw), Some(&Keyring::new()), now);
            prop_assert_ne!(reason, LicenseReason::Ok);
        }
    }
}
