//! zf-license: tier gating for zoneflow.
//!
//! A license is a compact JWT (`header.payload.signature`, base64url) signed
//! with Ed25519. Verification never fails loudly: the outcome is a
//! [`LicenseStatus`] whose [`LicenseReason`] names the first check that
//! rejected the token, or `Ok`.
//!
//! Contains:
//! - reason (closed failure enumeration)
//! - token (segment codec)
//! - keyring (kid -> public key, loaded from config or environment)
//! - verify (signature, claim and time-window checks)
//! - issue (token signing for operator tooling)

pub mod error;
pub mod issue;
pub mod keyring;
pub mod reason;
pub mod token;
pub mod verify;

pub use error::{LicenseError, LicenseResult};
pub use issue::{LicenseClaims, issue_token};
pub use keyring::{
    DEFAULT_KEY_ID, Keyring, PUBLIC_KEY_PEM_ENV, PUBLIC_KEYS_JSON_ENV,
};
pub use reason::LicenseReason;
pub use verify::{
    ALLOWED_ISSUERS, ALLOWED_SOURCES, ALLOWED_TIERS, Ed25519Verifier, LicenseStatus,
    LicenseVerifier, verify_token,
};
