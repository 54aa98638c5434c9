use serde::Deserialize;

/// ================================
/// Validators
/// ================================
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    pub endpoint: EndpointConfig,
    /// Accepted audiences; a token needs at least one of them.
    pub audiences: Vec<String>,
    /// Expected `iss`, compared verbatim.
    pub issuer: String,
    pub leeway_seconds: Option<u64>,
    pub key_cache_ttl_seconds: Option<u64>,
    pub min_key_refresh_seconds: Option<u64>,
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// `github`, `aws` or `oidc`; checked when the validator is built.
    #[serde(rename = "type")]
    pub endpoint_type: String,
    pub url: String,
}
