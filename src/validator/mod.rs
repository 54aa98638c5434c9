//! Validators module
//!
//! Builds a token validator from its configuration once: the endpoint family
//! picks how keys are located and which custom-claims schema applies.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};
use serde_json::{Map, Value};
use tracing::info;

use crate::config::validators::ValidatorConfig;
use crate::errors::{ConfigError, ValidationError};
use crate::helpers::time::{Clock, SystemClock};
use crate::utils::constants::{
    DEFAULT_HTTP_TIMEOUT_MS, DEFAULT_KEY_CACHE_TTL_SECS, DEFAULT_MIN_KEY_REFRESH_SECS,
};

pub mod claims;
pub mod jwks;
pub mod jwt;

use claims::{AwsClaims, CustomClaims, GitHubClaims, REGISTERED_CLAIM_NAMES};
use jwks::{KeyLocation, KeySetClient, KeySetOptions};
pub use jwt::{ValidateToken, Validator};

/// Issuer families with a known key location and claims schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointType {
    Github,
    Aws,
    Oidc,
}

impl EndpointType {
    pub const NAMES: [&'static str; 3] = ["github", "aws", "oidc"];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointType::Github => "github",
            EndpointType::Aws => "aws",
            EndpointType::Oidc => "oidc",
        }
    }

    /// `github` and `aws` publish the key set at the configured URL; `oidc`
    /// points at a discovery document.
    fn key_location(&self, url: Url) -> KeyLocation {
        match self {
            EndpointType::Github | EndpointType::Aws => KeyLocation::Jwks(url),
            EndpointType::Oidc => KeyLocation::Discovery(url),
        }
    }

    pub(crate) fn decode_custom(&self, payload: &Map<String, Value>) -> Result<CustomClaims, ValidationError> {
        let as_value = || Value::Object(payload.clone());
        match self {
            EndpointType::Github => serde_json::from_value::<GitHubClaims>(as_value())
                .map(CustomClaims::Github)
                .map_err(|e| ValidationError::InvalidClaims(format!("github claims: {}", e))),
            EndpointType::Aws => serde_json::from_value::<AwsClaims>(as_value())
                .map(CustomClaims::Aws)
                .map_err(|e| ValidationError::InvalidClaims(format!("aws claims: {}", e))),
            EndpointType::Oidc => Ok(CustomClaims::Oidc(
                payload
                    .iter()
                    .filter(|(name, _)| !REGISTERED_CLAIM_NAMES.contains(&name.as_str()))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect(),
            )),
        }
    }
}

impl FromStr for EndpointType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(EndpointType::Github),
            "aws" => Ok(EndpointType::Aws),
            "oidc" => Ok(EndpointType::Oidc),
            other => Err(ConfigError::UnknownEndpointType(other.to_owned())),
        }
    }
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a validator with its own HTTP client and the system clock.
pub fn new_validator(config: ValidatorConfig) -> Result<Validator, ConfigError> {
    let client = Client::builder()
        .timeout(request_timeout(&config))
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
    new_validator_with(config, client, Arc::new(SystemClock))
}

pub fn new_validator_with(
    config: ValidatorConfig,
    client: Client,
    clock: Arc<dyn Clock>,
) -> Result<Validator, ConfigError> {
    let family: EndpointType = config.endpoint.endpoint_type.parse()?;
    let url = Url::parse(&config.endpoint.url).map_err(|e| ConfigError::InvalidUrl {
        url: config.endpoint.url.clone(),
        reason: e.to_string(),
    })?;

    if config.issuer.trim().is_empty() {
        return Err(ConfigError::MissingIssuer);
    }
    let audiences: HashSet<String> = config.audiences.iter().cloned().collect();
    if audiences.is_empty() {
        return Err(ConfigError::MissingAudiences);
    }

    let options = KeySetOptions {
        request_timeout: request_timeout(&config),
        cache_ttl: Duration::from_secs(
            config.key_cache_ttl_seconds.unwrap_or(DEFAULT_KEY_CACHE_TTL_SECS),
        ),
        min_refresh_interval: Duration::from_secs(
            config.min_key_refresh_seconds.unwrap_or(DEFAULT_MIN_KEY_REFRESH_SECS),
        ),
    };
    let keys = KeySetClient::new(family.key_location(url), client, options);

    info!(
        family = family.as_str(),
        issuer = %config.issuer,
        key_endpoint = %config.endpoint.url,
        "validator built"
    );

    Ok(Validator::new(
        family,
        config.issuer,
        audiences,
        Duration::from_secs(config.leeway_seconds.unwrap_or(0)),
        keys,
        clock,
    ))
}

fn request_timeout(config: &ValidatorConfig) -> Duration {
    Duration::from_millis(config.request_timeout_ms.unwrap_or(DEFAULT_HTTP_TIMEOUT_MS))
}
