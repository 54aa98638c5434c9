//! Expiry extraction from freshly issued tokens.
//!
//! No signature, issuer or audience checks happen here. The result drives
//! cache expiry only and must never feed a trust decision.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::errors::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnverifiedClaims {
    pub expiry: DateTime<Utc>,
}

/// Split a compact JWT and read `exp` from its payload.
pub fn decode_unverified(token: &str) -> Result<UnverifiedClaims, DecodeError> {
    let payload = payload_segment(token)?;
    let decoded = decode_segment(payload)?;

    let json: Value = serde_json::from_slice(&decoded)
        .map_err(|e| DecodeError::MalformedToken(format!("payload is not JSON: {}", e)))?;
    let claims = json
        .as_object()
        .ok_or_else(|| DecodeError::MalformedToken("payload is not a JSON object".into()))?;

    let exp = claims.get("exp").ok_or(DecodeError::MissingExpiry)?;
    let exp_seconds = numeric_seconds(exp).ok_or(DecodeError::MissingExpiry)?;
    let expiry = DateTime::from_timestamp(exp_seconds, 0)
        .ok_or_else(|| DecodeError::MalformedToken(format!("exp {} out of range", exp_seconds)))?;

    debug!(expires_at = %expiry, "jwt expiry decoded");
    Ok(UnverifiedClaims { expiry })
}

/// Decode one base64url segment, padded or not.
pub fn decode_segment(segment: &str) -> Result<Vec<u8>, DecodeError> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| DecodeError::MalformedToken(format!("base64url decode error: {}", e)))
}

/// Integer or float seconds; floats truncate toward zero.
pub fn numeric_seconds(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
}

fn payload_segment(token: &str) -> Result<&str, DecodeError> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => Ok(payload),
        _ => Err(DecodeError::MalformedToken(format!(
            "expected 3 segments, got {}",
            token.split('.').count()
        ))),
    }
}
