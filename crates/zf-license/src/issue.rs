//! Token signing for operator tooling.

use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};

use crate::error::{LicenseError, LicenseResult};
use crate::token;

/// Payload claims of a license token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseClaims {
    pub iss: String,
    pub sub: String,
    pub src: String,
    pub tier: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
}

impl LicenseClaims {
    /// Claims valid from `now` for `days` days.
    pub fn for_days(
        issuer: &str,
        subject: &str,
        source: &str,
        tier: &str,
        now: DateTime<Utc>,
        days: i64,
    ) -> LicenseResult<Self> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(LicenseError::InvalidArg {
                what: "subject must not be empty",
            });
        }
        if days <= 0 {
            return Err(LicenseError::InvalidArg {
                what: "lifetime must be at least one day",
            });
        }
        let iat = now.timestamp();
        Ok(Self {
            iss: issuer.to_string(),
            sub: subject.to_string(),
            src: source.to_string(),
            tier: tier.to_string(),
            iat,
            exp: (now + Duration::days(days)).timestamp(),
            nbf: None,
        })
    }
}

#[derive(Serialize)]
struct Header<'a> {
    alg: &'static str,
    typ: &'static str,
    kid: &'a str,
}

/// Sign `claims` into a compact token carrying `kid` in its header.
pub fn issue_token(key: &SigningKey, kid: &str, claims: &LicenseClaims) -> LicenseResult<String> {
    let kid = kid.trim();
    if kid.is_empty() {
        return Err(LicenseError::InvalidArg {
            what: "key id must not be blank",
        });
    }
    let header = Header {
        alg: "EdDSA",
        typ: "JWT",
        kid,
    };
    let header = token::encode_segment(&serde_json::to_vec(&header)?);
    let payload = token::encode_segment(&serde_json::to_vec(claims)?);
    let signing_input = format!("{header}.{payload}");
    let signature = key.sign(signing_input.as_bytes());
    Ok(format!(
        "{signing_input}.{}",
        token::encode_segment(&signature.to_bytes())
    ))
}
