//! Error taxonomy shared by the acquisition and validation sides.
//!
//! Every enum is `Clone`: a single-flight outcome is handed to every waiter of
//! the round, so the same error value has to be observable more than once.
//!
//! Messages name the step that failed (which provider and HTTP call, which
//! parse stage, which validation check) so callers can tell "our credential
//! expired" from "the provider is unreachable" from "we were sent a forged token".

use thiserror::Error;
use tokio::task::JoinError;

/// Failures of the unverified decode step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("token payload carries no numeric exp claim")]
    MissingExpiry,
}

/// Failures while acquiring a token from a provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Missing environment values, bad endpoint, unloadable account config.
    /// Retrying cannot fix these.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{provider}: request failed: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },

    #[error("{provider}: request timed out after {timeout_ms}ms")]
    Timeout {
        provider: &'static str,
        timeout_ms: u64,
    },

    #[error("{provider}: unexpected status {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider}: invalid response: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },

    #[error("{provider}: issued token could not be decoded: {source}")]
    Decode {
        provider: &'static str,
        #[source]
        source: DecodeError,
    },

    #[error("token fetch aborted: {0}")]
    Aborted(String),
}

impl FetchError {
    /// Configuration errors are fatal; everything else may succeed on a later attempt.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, FetchError::Configuration(_))
    }
}

impl From<JoinError> for FetchError {
    fn from(err: JoinError) -> Self {
        FetchError::Aborted(err.to_string())
    }
}

/// Failures while building a validator from its configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown endpoint type '{0}' (expected one of: github, aws, oidc)")]
    UnknownEndpointType(String),

    #[error("invalid key endpoint url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("validator issuer must not be empty")]
    MissingIssuer,

    #[error("validator needs at least one audience")]
    MissingAudiences,

    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

/// Failures while validating an inbound token. Permanent for the token value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("key resolution failed for kid '{kid}': {reason}")]
    KeyResolution {
        kid: String,
        reason: String,
        /// The key endpoint could not be reached or returned garbage,
        /// as opposed to the key id simply being unknown.
        unavailable: bool,
    },

    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("token expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("issuer mismatch: expected '{expected}', got '{actual}'")]
    IssuerMismatch { expected: String, actual: String },

    #[error("audience mismatch: none of {actual:?} is accepted")]
    AudienceMismatch { actual: Vec<String> },

    #[error("custom claims invalid: {0}")]
    InvalidClaims(String),
}

impl ValidationError {
    /// Short name of the failing check, used as a structured log field.
    pub fn check(&self) -> &'static str {
        match self {
            ValidationError::MalformedToken(_) => "structure",
            ValidationError::KeyResolution { .. } => "key_resolution",
            ValidationError::SignatureInvalid(_) => "signature",
            ValidationError::Expired => "exp",
            ValidationError::NotYetValid => "nbf",
            ValidationError::IssuerMismatch { .. } => "iss",
            ValidationError::AudienceMismatch { .. } => "aud",
            ValidationError::InvalidClaims(_) => "custom_claims",
        }
    }

    /// HTTP status a middleware should answer with.
    ///
    /// Token problems are always 401. Only an unreachable key endpoint is
    /// reported as 503, since the caller's credential may well be fine.
    pub fn status_code(&self) -> u16 {
        match self {
            ValidationError::KeyResolution {
                unavailable: true, ..
            } => 503,
            _ => 401,
        }
    }
}

impl From<JoinError> for ValidationError {
    fn from(err: JoinError) -> Self {
        ValidationError::KeyResolution {
            kid: String::new(),
            reason: format!("key refresh aborted: {}", err),
            unavailable: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_errors_are_fatal() {
        assert!(!FetchError::Configuration("missing".into()).is_retriable());
        assert!(FetchError::Status {
            provider: "github_actions",
            status: 500,
            body: "boom".into()
        }
        .is_retriable());
        assert!(FetchError::Timeout {
            provider: "exchange",
            timeout_ms: 10
        }
        .is_retriable());
    }

    #[test]
    fn validation_errors_map_to_unauthorized_unless_keys_unreachable() {
        assert_eq!(ValidationError::Expired.status_code(), 401);
        assert_eq!(
            ValidationError::AudienceMismatch { actual: vec![] }.status_code(),
            401
        );
        let unknown_kid = ValidationError::KeyResolution {
            kid: "k".into(),
            reason: "unknown".into(),
            unavailable: false,
        };
        assert_eq!(unknown_kid.status_code(), 401);
        let unreachable = ValidationError::KeyResolution {
            kid: "k".into(),
            reason: "connection refused".into(),
            unavailable: true,
        };
        assert_eq!(unreachable.status_code(), 503);
    }

    #[test]
    fn fetch_error_names_the_provider() {
        let err = FetchError::Decode {
            provider: "github_actions",
            source: DecodeError::MissingExpiry,
        };
        assert!(err.to_string().starts_with("github_actions:"));
    }
}
