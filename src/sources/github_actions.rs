use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info};

use crate::cache::token::Token;
use crate::errors::FetchError;
use crate::parser::unverified::decode_unverified;
use crate::sources::env::{EnvSource, ProcessEnv};
use crate::sources::{transport_error, FetchToken};
use crate::utils::constants::{
    ACTIONS_ID_TOKEN_REQUEST_TOKEN, ACTIONS_ID_TOKEN_REQUEST_URL, GITHUB_ACTIONS_GRACE_SECS,
};

const PROVIDER: &str = "github_actions";

#[derive(Debug, Deserialize)]
struct IdTokenResponse {
    #[serde(default)]
    value: Option<String>,
}

/// Ambient metadata provider: the runner injects a request token and URL into
/// the job environment and hands out OIDC tokens on request.
#[derive(Clone)]
pub struct GitHubActionsSource {
    request_token: String,
    request_url: Url,
    audience: Option<String>,
    client: Client,
    timeout: Duration,
}

impl std::fmt::Debug for GitHubActionsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubActionsSource")
            .field("request_url", &self.request_url.as_str())
            .field("audience", &self.audience)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GitHubActionsSource {
    /// Read the request token and URL from the process environment, once.
    pub fn from_env(
        audience: Option<String>,
        client: Client,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        Self::from_env_source(&ProcessEnv, audience, client, timeout)
    }

    pub fn from_env_source(
        env: &dyn EnvSource,
        audience: Option<String>,
        client: Client,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let request_token = env.non_empty(ACTIONS_ID_TOKEN_REQUEST_TOKEN).ok_or_else(|| {
            FetchError::Configuration(format!(
                "{} is not set; is the job granted `id-token: write`?",
                ACTIONS_ID_TOKEN_REQUEST_TOKEN
            ))
        })?;
        let raw_url = env.non_empty(ACTIONS_ID_TOKEN_REQUEST_URL).ok_or_else(|| {
            FetchError::Configuration(format!("{} is not set", ACTIONS_ID_TOKEN_REQUEST_URL))
        })?;
        let request_url = Url::parse(&raw_url).map_err(|e| {
            FetchError::Configuration(format!(
                "{} is not a valid url: {}",
                ACTIONS_ID_TOKEN_REQUEST_URL, e
            ))
        })?;

        Ok(Self {
            request_token,
            request_url,
            audience: audience.filter(|a| !a.is_empty()),
            client,
            timeout,
        })
    }

    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    fn token_url(&self) -> Url {
        let mut url = self.request_url.clone();
        if let Some(audience) = &self.audience {
            url.query_pairs_mut().append_pair("audience", audience);
        }
        url
    }
}

impl FetchToken for GitHubActionsSource {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn grace_window(&self) -> Duration {
        Duration::from_secs(GITHUB_ACTIONS_GRACE_SECS)
    }

    async fn fetch(&self) -> Result<Token, FetchError> {
        let url = self.token_url();
        debug!(audience = ?self.audience, "requesting id token from actions runtime");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.request_token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e, self.timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(PROVIDER, e, self.timeout))?;

        if status != StatusCode::OK {
            return Err(FetchError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: IdTokenResponse =
            serde_json::from_str(&body).map_err(|e| FetchError::InvalidResponse {
                provider: PROVIDER,
                message: format!("body is not the expected JSON: {}", e),
            })?;

        // the runtime may append a trailing newline
        let value = parsed
            .value
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| FetchError::InvalidResponse {
                provider: PROVIDER,
                message: "response carries no token value".into(),
            })?;

        let claims = decode_unverified(&value).map_err(|source| FetchError::Decode {
            provider: PROVIDER,
            source,
        })?;

        info!(expires_at = %claims.expiry, "actions id token issued");
        Ok(Token::bearer(value, claims.expiry))
    }
}
