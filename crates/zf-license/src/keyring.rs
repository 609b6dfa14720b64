//! Public keys used to verify license signatures, keyed by `kid`.
//!
//! Sources, first match wins: the installation's configured key map, the
//! [`PUBLIC_KEYS_JSON_ENV`] variable (JSON object kid -> PEM), then the
//! [`PUBLIC_KEY_PEM_ENV`] variable (one PEM stored under
//! [`DEFAULT_KEY_ID`]). No key is compiled in.

use std::collections::BTreeMap;

use ed25519_dalek::VerifyingKey;
use ed25519_dalek::pkcs8::DecodePublicKey;

use crate::error::{LicenseError, LicenseResult};

/// Key id used when a token carries no `kid` header.
pub const DEFAULT_KEY_ID: &str = "main";
pub const PUBLIC_KEYS_JSON_ENV: &str = "ZONEFLOW_LICENSE_PUBLIC_KEYS_JSON";
pub const PUBLIC_KEY_PEM_ENV: &str = "ZONEFLOW_LICENSE_PUBLIC_KEY_PEM";

#[derive(Debug, Clone, Default)]
pub struct Keyring {
    keys: BTreeMap<String, VerifyingKey>,
}

fn parse_pem(kid: &str, pem: &str) -> LicenseResult<VerifyingKey> {
    if pem.trim().is_empty() {
        return Err(LicenseError::KeyLoad {
            kid: kid.to_string(),
            reason: "empty PEM".to_string(),
        });
    }
    VerifyingKey::from_public_key_pem(pem.trim()).map_err(|err| LicenseError::KeyLoad {
        kid: kid.to_string(),
        reason: err.to_string(),
    })
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kid: impl Into<String>, key: VerifyingKey) -> LicenseResult<()> {
        let kid = kid.into();
        if kid.trim().is_empty() {
            return Err(LicenseError::InvalidArg {
                what: "key id must not be blank",
            });
        }
        self.keys.insert(kid, key);
        Ok(())
    }

    /// One PEM public key stored under [`DEFAULT_KEY_ID`].
    pub fn from_pem(pem: &str) -> LicenseResult<Self> {
        let mut ring = Self::new();
        ring.insert(DEFAULT_KEY_ID, parse_pem(DEFAULT_KEY_ID, pem)?)?;
        Ok(ring)
    }

    /// Every entry must load; one bad key rejects the whole ring.
    pub fn from_pem_map<'a, I>(entries: I) -> LicenseResult<Self>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut ring = Self::new();
        for (kid, pem) in entries {
            let key = parse_pem(kid, pem)?;
            ring.insert(kid.clone(), key)?;
        }
        if ring.is_empty() {
            return Err(LicenseError::EmptyKeyring);
        }
        Ok(ring)
    }

    pub fn from_json(json: &str) -> LicenseResult<Self> {
        let map: BTreeMap<String, String> = serde_json::from_str(json)?;
        Self::from_pem_map(&map)
    }

    pub fn from_env() -> LicenseResult<Self> {
        match std::env::var(PUBLIC_KEYS_JSON_ENV) {
            Ok(json) if !json.trim().is_empty() => return Self::from_json(&json),
            _ => {}
        }
        match std::env::var(PUBLIC_KEY_PEM_ENV) {
            Ok(pem) if !pem.trim().is_empty() => Self::from_pem(&pem),
            _ => Err(LicenseError::EmptyKeyring),
        }
    }

    /// Configured keys when present, otherwise the environment.
    pub fn load(configured: Option<&BTreeMap<String, String>>) -> LicenseResult<Self> {
        match configured {
            Some(map) if !map.is_empty() => Self::from_pem_map(map),
            _ => Self::from_env(),
        }
    }

    /// Key for `kid`; without a kid, the default key or the only key.
    pub fn resolve(&self, kid: Option<&str>) -> Option<&VerifyingKey> {
        match kid {
            Some(kid) => self.keys.get(kid),
            None => self.keys.get(DEFAULT_KEY_ID).or_else(|| {
                if self.keys.len() == 1 {
                    self.keys.values().next()
                } else {
                    None
                }
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
