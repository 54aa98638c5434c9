use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::token::Token;
use crate::errors::FetchError;
use crate::sources::{transport_error, FetchToken};
use crate::utils::constants::{DEFAULT_EXCHANGE_TIMEOUT_MS, EXCHANGE_GRACE_SECS};

const PROVIDER: &str = "exchange";

/// What the workload asks the exchange for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeIdentity {
    pub audience: String,
    pub signing_algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest {
    pub audience: Vec<String>,
    pub signing_algorithm: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExchangeResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
}

/// The remote web-identity exchange. Account context (credentials, region,
/// endpoint) is resolved when the implementation is built.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    async fn exchange(&self, request: &ExchangeRequest) -> Result<ExchangeResponse, FetchError>;
}

/// Exchange provider: trades the ambient account identity for a signed ID token.
#[derive(Clone)]
pub struct ExchangeSource {
    api: Arc<dyn ExchangeApi>,
    identity: ExchangeIdentity,
    call_timeout: Duration,
}

impl std::fmt::Debug for ExchangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeSource")
            .field("identity", &self.identity)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl ExchangeSource {
    pub fn new(api: Arc<dyn ExchangeApi>, identity: ExchangeIdentity) -> Self {
        Self {
            api,
            identity,
            call_timeout: Duration::from_millis(DEFAULT_EXCHANGE_TIMEOUT_MS),
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn identity(&self) -> &ExchangeIdentity {
        &self.identity
    }
}

impl FetchToken for ExchangeSource {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn grace_window(&self) -> Duration {
        Duration::from_secs(EXCHANGE_GRACE_SECS)
    }

    async fn fetch(&self) -> Result<Token, FetchError> {
        let request = ExchangeRequest {
            audience: vec![self.identity.audience.clone()],
            signing_algorithm: self.identity.signing_algorithm.clone(),
        };
        debug!(audience = %self.identity.audience, alg = %self.identity.signing_algorithm, "calling web identity exchange");

        let response = tokio::time::timeout(self.call_timeout, self.api.exchange(&request))
            .await
            .map_err(|_| FetchError::Timeout {
                provider: PROVIDER,
                timeout_ms: self.call_timeout.as_millis() as u64,
            })??;

        let value = response
            .token
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FetchError::InvalidResponse {
                provider: PROVIDER,
                message: "exchange returned no token".into(),
            })?;
        let expiry = response.expiration.ok_or_else(|| FetchError::InvalidResponse {
            provider: PROVIDER,
            message: "exchange returned no expiration".into(),
        })?;

        info!(expires_at = %expiry, "web identity token issued");
        Ok(Token::bearer(value, expiry))
    }
}

/// JSON-over-HTTP exchange endpoint speaking the request/response shapes above.
#[derive(Debug, Clone)]
pub struct HttpExchangeApi {
    endpoint: Url,
    client: Client,
    timeout: Duration,
}

impl HttpExchangeApi {
    pub fn new(endpoint: &str, client: Client, timeout: Duration) -> Result<Self, FetchError> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            FetchError::Configuration(format!("invalid exchange endpoint '{}': {}", endpoint, e))
        })?;
        Ok(Self {
            endpoint,
            client,
            timeout,
        })
    }
}

#[async_trait]
impl ExchangeApi for HttpExchangeApi {
    async fn exchange(&self, request: &ExchangeRequest) -> Result<ExchangeResponse, FetchError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e, self.timeout))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<ExchangeResponse>()
            .await
            .map_err(|e| FetchError::InvalidResponse {
                provider: PROVIDER,
                message: format!("body is not the expected JSON: {}", e),
            })
    }
}
