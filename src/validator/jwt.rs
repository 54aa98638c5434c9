use std::collections::{HashSet, BTreeSet};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::errors::{DecodeError, ValidationError};
use crate::helpers::time::Clock;
use crate::parser::unverified::{decode_segment, numeric_seconds};
use crate::utils::constants::MAX_JWT_SIZE_BYTES;
use crate::validator::claims::{audience_set, Claims, RegisteredClaims};
use crate::validator::jwks::KeySetClient;
use crate::validator::EndpointType;

/// Validate one inbound token against a trust policy.
pub trait ValidateToken: Send + Sync {
    fn validate(&self, token: &str) -> impl Future<Output = Result<Claims, ValidationError>> + Send;
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

struct ParsedToken {
    header: RawHeader,
    payload: Map<String, Value>,
}

/// Trust policy for one issuer, bound to its key set.
pub struct Validator {
    family: EndpointType,
    issuer: String,
    audiences: HashSet<String>,
    leeway: Duration,
    keys: KeySetClient,
    clock: Arc<dyn Clock>,
}

impl Validator {
    pub(crate) fn new(
        family: EndpointType,
        issuer: String,
        audiences: HashSet<String>,
        leeway: Duration,
        keys: KeySetClient,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            family,
            issuer,
            audiences,
            leeway,
            keys,
            clock,
        }
    }

    pub fn family(&self) -> EndpointType {
        self.family
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audiences(&self) -> &HashSet<String> {
        &self.audiences
    }

    pub async fn validate(&self, token: &str) -> Result<Claims, ValidationError> {
        let kid = peek_kid(token);
        match self.run_checks(token).await {
            Ok(claims) => {
                debug!(
                    issuer = %self.issuer,
                    family = self.family.as_str(),
                    subject = claims.subject().unwrap_or_default(),
                    "token accepted"
                );
                Ok(claims)
            }
            Err(err) => {
                let audiences: BTreeSet<&str> = self.audiences.iter().map(String::as_str).collect();
                warn!(
                    issuer = %self.issuer,
                    audiences = ?audiences,
                    kid = kid.as_deref().unwrap_or_default(),
                    check = err.check(),
                    error = %err,
                    "token rejected"
                );
                Err(err)
            }
        }
    }

    async fn run_checks(&self, token: &str) -> Result<Claims, ValidationError> {
        let parsed = parse_compact(token)?;
        let algorithm = accepted_algorithm(&parsed.header.alg)?;

        let kid = parsed
            .header
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| ValidationError::KeyResolution {
                kid: String::new(),
                reason: "token header carries no kid".into(),
                unavailable: false,
            })?;
        let key = self.keys.get_key(kid).await?;

        if let Some(pinned) = key.algorithm.as_deref() {
            if pinned != parsed.header.alg {
                return Err(ValidationError::SignatureInvalid(format!(
                    "key '{}' is published for {}, token uses {}",
                    kid, pinned, parsed.header.alg
                )));
            }
        }
        verify_signature(token, &key.key, algorithm)?;

        let registered = self.check_registered(&parsed.payload)?;
        let custom = self.family.decode_custom(&parsed.payload)?;
        Ok(Claims { registered, custom })
    }

    fn check_registered(&self, payload: &Map<String, Value>) -> Result<RegisteredClaims, ValidationError> {
        let now = self.clock.now();
        let leeway = ChronoDuration::from_std(self.leeway).unwrap_or_else(|_| ChronoDuration::zero());

        let expiry = numeric_date(payload, "exp")?
            .ok_or_else(|| ValidationError::MalformedToken("token carries no exp claim".into()))?;
        let not_before = numeric_date(payload, "nbf")?;
        let issued_at = numeric_date(payload, "iat")?;

        // an out-of-range sum lies past any reachable instant
        if expiry.checked_add_signed(leeway).is_some_and(|limit| now >= limit) {
            return Err(ValidationError::Expired);
        }
        if let Some(nbf) = not_before {
            if now.checked_add_signed(leeway).is_some_and(|shifted| shifted < nbf) {
                return Err(ValidationError::NotYetValid);
            }
        }

        let issuer = payload.get("iss").and_then(Value::as_str).unwrap_or_default();
        if issuer != self.issuer {
            return Err(ValidationError::IssuerMismatch {
                expected: self.issuer.clone(),
                actual: issuer.to_owned(),
            });
        }

        let audience = audience_set(payload.get("aud")).map_err(ValidationError::MalformedToken)?;
        if !audience.iter().any(|aud| self.audiences.contains(aud)) {
            return Err(ValidationError::AudienceMismatch { actual: audience });
        }

        Ok(RegisteredClaims {
            issuer: issuer.to_owned(),
            subject: payload.get("sub").and_then(Value::as_str).map(str::to_owned),
            audience,
            expiry,
            issued_at,
            not_before,
        })
    }
}

impl ValidateToken for Validator {
    async fn validate(&self, token: &str) -> Result<Claims, ValidationError> {
        Validator::validate(self, token).await
    }
}

fn parse_compact(token: &str) -> Result<ParsedToken, ValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        return Err(ValidationError::MalformedToken(format!(
            "token is {} bytes, limit is {}",
            token.len(),
            MAX_JWT_SIZE_BYTES
        )));
    }

    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(ValidationError::MalformedToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    let header_bytes = decode_segment(segments[0]).map_err(malformed("header"))?;
    let header: RawHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| ValidationError::MalformedToken(format!("header is not a JWS header: {}", e)))?;

    let payload_bytes = decode_segment(segments[1]).map_err(malformed("payload"))?;
    let payload = match serde_json::from_slice::<Value>(&payload_bytes) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(ValidationError::MalformedToken("payload is not a JSON object".into())),
        Err(e) => {
            return Err(ValidationError::MalformedToken(format!("payload is not JSON: {}", e)))
        }
    };

    Ok(ParsedToken { header, payload })
}

fn malformed(segment: &'static str) -> impl Fn(DecodeError) -> ValidationError {
    move |err| ValidationError::MalformedToken(format!("{}: {}", segment, err))
}

/// Only asymmetric algorithms verify against a published key set.
fn accepted_algorithm(alg: &str) -> Result<Algorithm, ValidationError> {
    if alg.eq_ignore_ascii_case("none") {
        return Err(ValidationError::SignatureInvalid(
            "unsigned tokens are not accepted".into(),
        ));
    }
    let algorithm = Algorithm::from_str(alg)
        .map_err(|_| ValidationError::SignatureInvalid(format!("unsupported algorithm '{}'", alg)))?;
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Err(
            ValidationError::SignatureInvalid(format!("symmetric algorithm '{}' is not accepted", alg)),
        ),
        other => Ok(other),
    }
}

/// Signature only; time, issuer and audience checks run against the injected clock.
fn verify_signature(token: &str, key: &DecodingKey, algorithm: Algorithm) -> Result<(), ValidationError> {
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    jsonwebtoken::decode::<Value>(token, key, &validation)
        .map(|_| ())
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => {
                ValidationError::SignatureInvalid("signature does not match the key".into())
            }
            _ => ValidationError::SignatureInvalid(e.to_string()),
        })
}

fn numeric_date(payload: &Map<String, Value>, claim: &str) -> Result<Option<DateTime<Utc>>, ValidationError> {
    let Some(value) = payload.get(claim) else {
        return Ok(None);
    };
    let seconds = numeric_seconds(value)
        .ok_or_else(|| ValidationError::MalformedToken(format!("{} is not a numeric date", claim)))?;
    DateTime::from_timestamp(seconds, 0)
        .map(Some)
        .ok_or_else(|| ValidationError::MalformedToken(format!("{} is out of range", claim)))
}

/// Best-effort kid for log lines about tokens that may not even parse.
fn peek_kid(token: &str) -> Option<String> {
    let header = token.split('.').next()?;
    let bytes = decode_segment(header).ok()?;
    serde_json::from_slice::<RawHeader>(&bytes).ok()?.kid
}
