//! Signing key resolution from a published JSON Web Key Set.
//!
//! Keys are cached by `kid`. A miss (unknown kid) or an expired cache triggers
//! a refresh; concurrent refreshes collapse into one request. Refreshes
//! are rate limited so neither made-up key ids nor a failing key endpoint
//! turn a stream of validations into a stream of requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::DecodingKey;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::cache::flight::Flight;
use crate::errors::ValidationError;

/// Where the key set lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLocation {
    /// The URL serves the key set itself.
    Jwks(Url),
    /// The URL serves an OpenID discovery document naming the key set in `jwks_uri`.
    Discovery(Url),
}

#[derive(Debug, Clone, Copy)]
pub struct KeySetOptions {
    pub request_timeout: Duration,
    pub cache_ttl: Duration,
    pub min_refresh_interval: Duration,
}

/// A verification key ready for use.
#[derive(Clone)]
pub struct ResolvedKey {
    pub kid: String,
    /// `alg` the key set pins this key to, if any.
    pub algorithm: Option<String>,
    pub key: DecodingKey,
}

impl std::fmt::Debug for ResolvedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

type KeyMap = HashMap<String, ResolvedKey>;

#[derive(Debug, Deserialize)]
struct RawKeySet {
    #[serde(default)]
    keys: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
}

#[derive(Default)]
struct KeySetState {
    keys: Arc<KeyMap>,
    jwks_url: Option<Url>,
    fetched_at: Option<Instant>,
    last_attempt: Option<Instant>,
    last_failure: Option<ValidationError>,
    in_flight: Option<Flight<Arc<KeyMap>, ValidationError>>,
}

#[derive(Debug, Clone)]
struct KeySetFetcher {
    location: KeyLocation,
    http_client: Client,
    request_timeout: Duration,
}

/// Thread-safe key set client shared by every validation on one validator.
pub struct KeySetClient {
    fetcher: KeySetFetcher,
    options: KeySetOptions,
    state: Arc<Mutex<KeySetState>>,
}

impl KeySetClient {
    pub fn new(location: KeyLocation, http_client: Client, options: KeySetOptions) -> Self {
        Self {
            fetcher: KeySetFetcher {
                location,
                http_client,
                request_timeout: options.request_timeout,
            },
            options,
            state: Arc::new(Mutex::new(KeySetState::default())),
        }
    }

    pub fn location(&self) -> &KeyLocation {
        &self.fetcher.location
    }

    /// Look up a key by id, refreshing the set when the id is unknown or the
    /// cache is older than its TTL.
    #[instrument(skip(self))]
    pub async fn get_key(&self, kid: &str) -> Result<ResolvedKey, ValidationError> {
        let flight = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let stale = state
                .fetched_at
                .map_or(true, |at| now.duration_since(at) >= self.options.cache_ttl);

            if !stale {
                if let Some(key) = state.keys.get(kid) {
                    debug!(kid, "key cache hit");
                    return Ok(key.clone());
                }
            }

            match &state.in_flight {
                Some(flight) => flight.clone(),
                None => {
                    let throttled = state.last_attempt.is_some_and(|at| {
                        now.duration_since(at) < self.options.min_refresh_interval
                    });
                    if throttled {
                        if !stale {
                            debug!(kid, "unknown kid, key set refreshed moments ago");
                            return Err(unknown_kid(kid));
                        }
                        // expired cache, but the endpoint was tried moments ago
                        if let Some(key) = state.keys.get(kid) {
                            debug!(kid, "key set refresh throttled, using cached key");
                            return Ok(key.clone());
                        }
                        if let Some(err) = &state.last_failure {
                            debug!(kid, "key set refresh throttled after a failure");
                            return Err(with_kid(err.clone(), kid));
                        }
                    }
                    let flight = self.launch(state.jwks_url.clone());
                    state.in_flight = Some(flight.clone());
                    flight
                }
            }
        };

        match flight.clone().wait().await {
            Ok(keys) => keys.get(kid).cloned().ok_or_else(|| {
                warn!(kid, "kid not found in key set after refresh");
                unknown_kid(kid)
            }),
            Err(err) => {
                let mut state = self.state.lock().await;
                if state.in_flight.as_ref().is_some_and(|f| f.same_as(&flight)) {
                    state.in_flight = None;
                }
                // an unreachable endpoint does not invalidate keys we already hold
                if let Some(key) = state.keys.get(kid) {
                    warn!(kid, error = %err, "key set refresh failed, using cached key");
                    return Ok(key.clone());
                }
                Err(with_kid(err, kid))
            }
        }
    }

    fn launch(&self, known_jwks_url: Option<Url>) -> Flight<Arc<KeyMap>, ValidationError> {
        let fetcher = self.fetcher.clone();
        let state = self.state.clone();

        Flight::spawn(async move {
            let result = fetcher.fetch(known_jwks_url).await;

            let mut state = state.lock().await;
            state.in_flight = None;
            state.last_attempt = Some(Instant::now());
            match result {
                Ok((jwks_url, keys)) => {
                    info!(url = %jwks_url, key_count = keys.len(), "key set refreshed");
                    state.keys = Arc::new(keys);
                    state.jwks_url = Some(jwks_url);
                    state.fetched_at = Some(Instant::now());
                    state.last_failure = None;
                    Ok(state.keys.clone())
                }
                Err(err) => {
                    warn!(error = %err, "key set refresh failed");
                    state.last_failure = Some(err.clone());
                    Err(err)
                }
            }
        })
    }
}

impl KeySetFetcher {
    async fn fetch(&self, known_jwks_url: Option<Url>) -> Result<(Url, KeyMap), ValidationError> {
        let jwks_url = match (&self.location, known_jwks_url) {
            (KeyLocation::Jwks(url), _) => url.clone(),
            (KeyLocation::Discovery(_), Some(url)) => url,
            (KeyLocation::Discovery(url), None) => self.discover(url).await?,
        };

        debug!(url = %jwks_url, "fetching key set");
        let raw: RawKeySet = self.get_json(&jwks_url).await?;
        Ok((jwks_url, parse_key_set(raw)))
    }

    async fn discover(&self, url: &Url) -> Result<Url, ValidationError> {
        debug!(url = %url, "fetching discovery document");
        let document: DiscoveryDocument = self.get_json(url).await?;
        Url::parse(&document.jwks_uri)
            .map_err(|e| unavailable(format!("discovery jwks_uri '{}' is invalid: {}", document.jwks_uri, e)))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &Url) -> Result<T, ValidationError> {
        let response = self
            .http_client
            .get(url.clone())
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| unavailable(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("GET {} returned {}", url, status)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| unavailable(format!("GET {} returned an unparseable body: {}", url, e)))
    }
}

/// Keep every usable signing key; skip the rest with a log line.
fn parse_key_set(raw: RawKeySet) -> KeyMap {
    let mut keys = KeyMap::new();
    for value in raw.keys {
        let kid = match value.get("kid").and_then(Value::as_str) {
            Some(kid) if !kid.is_empty() => kid.to_owned(),
            _ => {
                debug!("skipping key without kid");
                continue;
            }
        };
        if value.get("use").and_then(Value::as_str) == Some("enc") {
            debug!(kid = %kid, "skipping encryption key");
            continue;
        }
        let algorithm = value.get("alg").and_then(Value::as_str).map(str::to_owned);

        let decoded = serde_json::from_value::<Jwk>(value)
            .map_err(|e| e.to_string())
            .and_then(|jwk| DecodingKey::from_jwk(&jwk).map_err(|e| e.to_string()));
        match decoded {
            Ok(key) => {
                keys.insert(kid.clone(), ResolvedKey { kid, algorithm, key });
            }
            Err(e) => warn!(kid = %kid, error = %e, "skipping unusable key"),
        }
    }
    keys
}

fn unknown_kid(kid: &str) -> ValidationError {
    ValidationError::KeyResolution {
        kid: kid.to_owned(),
        reason: "no key with this id in the key set".into(),
        unavailable: false,
    }
}

fn unavailable(reason: String) -> ValidationError {
    ValidationError::KeyResolution {
        kid: String::new(),
        reason,
        unavailable: true,
    }
}

fn with_kid(err: ValidationError, kid: &str) -> ValidationError {
    match err {
        ValidationError::KeyResolution {
            reason, unavailable, ..
        } => ValidationError::KeyResolution {
            kid: kid.to_owned(),
            reason,
            unavailable,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_set_parsing_skips_unusable_entries() {
        let raw: RawKeySet = serde_json::from_value(json!({
            "keys": [
                {"kty": "RSA", "kid": "good", "alg": "RS256", "use": "sig", "n": "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1WlUzewbgBHod5pcM9H95GQRV3JDXboIRROSBigeC5yjU1hGzHHyXss8UDprecbAYxknTcQkhslANGRUZmdTOQ5qTRsLAt6BTYuyvVRdhS8exSZEy_c4gs_7svlJJQ4H9_NxsiIoLwAEk7-Q3UXERGYw_75IDrGA84-lA_-Ct4eTlXHBIY2EaV7t7LjJaynVJCpkv4LKjTTAumiGUIuQhrNhZLuF_RJLqHpM2kgWFLU7-VTdL1VbC2tejvcI2BlMkEpk1BzBZI0KQB0GaDWFLN-aEAw3vRw", "e": "AQAB"},
                {"kty": "RSA", "alg": "RS256", "n": "AQAB", "e": "AQAB"},
                {"kty": "RSA", "kid": "enc-key", "use": "enc", "n": "AQAB", "e": "AQAB"},
                {"kty": "XYZ", "kid": "weird"}
            ]
        }))
        .unwrap();

        let keys = parse_key_set(raw);
        assert_eq!(keys.len(), 1);
        let key = keys.get("good").unwrap();
        assert_eq!(key.algorithm.as_deref(), Some("RS256"));
    }

    #[test]
    fn refresh_errors_carry_the_requested_kid() {
        let err = with_kid(unavailable("connection refused".into()), "k1");
        assert!(matches!(
            err,
            ValidationError::KeyResolution { kid, unavailable: true, .. } if kid == "k1"
        ));
    }
}
