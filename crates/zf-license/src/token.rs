//! Compact JWT segment codec.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde_json::{Map, Value};

/// base64url without padding on encode; accepts padded segments on decode.
const B64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Header, payload and signature of a token, plus the exact signed bytes.
#[derive(Debug, Clone)]
pub struct DecodedToken {
    pub header: Map<String, Value>,
    pub payload: Map<String, Value>,
    pub signing_input: String,
    pub signature: Vec<u8>,
}

/// Trim surrounding whitespace. Keys without a dot are legacy codes and
/// are upper-cased; they never decode as a token.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains('.') {
        trimmed.to_string()
    } else {
        trimmed.to_uppercase()
    }
}

pub fn encode_segment(bytes: &[u8]) -> String {
    B64URL.encode(bytes)
}

pub fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    B64URL.decode(segment).ok()
}

fn decode_object(segment: &str) -> Option<Map<String, Value>> {
    let bytes = decode_segment(segment)?;
    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Split and decode a token. `None` means malformed.
pub fn decode(token: &str) -> Option<DecodedToken> {
    let mut parts = token.split('.');
    let (header, payload, signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let signature_bytes = decode_segment(signature)?;
    let header_map = decode_object(header)?;
    let payload_map = decode_object(payload)?;

    Some(DecodedToken {
        header: header_map,
        payload: payload_map,
        signing_input: format!("{header}.{payload}"),
        signature: signature_bytes,
    })
}
