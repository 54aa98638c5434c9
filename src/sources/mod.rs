//! Sources module
//!
//! Provider adapters that fetch one fresh ID token on demand, and the factory
//! that builds them from config.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::info;

use crate::cache::token::Token;
use crate::cache::token_cache::TokenCache;
use crate::config::settings::SettingsConfig;
use crate::config::sources::{ExchangeKind, SourceConfig, SourceTypes};
use crate::errors::FetchError;
use crate::helpers::time::get_grace_window;
use crate::utils::constants::{
    DEFAULT_EXCHANGE_TIMEOUT_MS, DEFAULT_GRACE_SECS,
    DEFAULT_HTTP_TIMEOUT_MS, DEFAULT_SIGNING_ALGORITHM,
};

#[cfg(feature = "aws-sts")]
pub mod aws_sts;
pub mod env;
pub mod exchange;
pub mod github_actions;

use exchange::{ExchangeApi, ExchangeIdentity, ExchangeSource, HttpExchangeApi};
use github_actions::GitHubActionsSource;

/// Fetch one fresh token now. Implementations may block on network I/O and
/// bound every call with a timeout; dropping the future cancels the call.
pub trait FetchToken: Send + Sync {
    /// Label used in logs and errors.
    fn provider(&self) -> &'static str;

    /// Provider default for how long before expiry a cached token is refreshed.
    fn grace_window(&self) -> Duration {
        Duration::from_secs(DEFAULT_GRACE_SECS)
    }

    fn fetch(&self) -> impl Future<Output = Result<Token, FetchError>> + Send;
}

#[derive(Debug, Clone)]
pub enum SourceKind {
    GitHubActions(GitHubActionsSource),
    Exchange(ExchangeSource),
}

impl FetchToken for SourceKind {
    fn provider(&self) -> &'static str {
        match self {
            SourceKind::GitHubActions(s) => s.provider(),
            SourceKind::Exchange(s) => s.provider(),
        }
    }

    fn grace_window(&self) -> Duration {
        match self {
            SourceKind::GitHubActions(s) => s.grace_window(),
            SourceKind::Exchange(s) => s.grace_window(),
        }
    }

    async fn fetch(&self) -> Result<Token, FetchError> {
        match self {
            SourceKind::GitHubActions(s) => s.fetch().await,
            SourceKind::Exchange(s) => s.fetch().await,
        }
    }
}

/// Build the provider adapter for one configured source.
pub async fn build_source(
    name: &str,
    cfg: &SourceConfig,
    settings: &SettingsConfig,
    client: &Client,
) -> Result<SourceKind, FetchError> {
    let source = match cfg.source_type {
        SourceTypes::GithubActions => {
            let timeout = Duration::from_millis(
                cfg.timeout_ms
                    .or(settings.http_timeout_ms)
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_MS),
            );
            SourceKind::GitHubActions(GitHubActionsSource::from_env(
                cfg.audience.clone(),
                client.clone(),
                timeout,
            )?)
        }
        SourceTypes::Exchange => {
            let audience = cfg.audience.clone().ok_or_else(|| {
                FetchError::Configuration(format!("source '{}' needs an audience", name))
            })?;
            let identity = ExchangeIdentity {
                audience,
                signing_algorithm: cfg
                    .signing_algorithm
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SIGNING_ALGORITHM.to_owned()),
            };
            let call_timeout =
                Duration::from_millis(cfg.timeout_ms.unwrap_or(DEFAULT_EXCHANGE_TIMEOUT_MS));
            let api = build_exchange_api(name, cfg, client, call_timeout).await?;
            SourceKind::Exchange(ExchangeSource::new(api, identity).with_call_timeout(call_timeout))
        }
    };
    info!(source = name, provider = source.provider(), "source built");
    Ok(source)
}

/// Build a source and wrap it in a cache whose grace window follows
/// source, then settings, then provider defaults.
pub async fn build_token_source(
    name: &str,
    cfg: &SourceConfig,
    settings: &SettingsConfig,
    client: &Client,
) -> Result<TokenCache<SourceKind>, FetchError> {
    let source = build_source(name, cfg, settings, client).await?;
    let grace = get_grace_window(settings.grace_seconds, cfg.grace_seconds, source.grace_window());
    Ok(TokenCache::new(source).with_grace(grace))
}

async fn build_exchange_api(
    name: &str,
    cfg: &SourceConfig,
    client: &Client,
    call_timeout: Duration,
) -> Result<Arc<dyn ExchangeApi>, FetchError> {
    let exchange = cfg.exchange.as_ref().ok_or_else(|| {
        FetchError::Configuration(format!("source '{}' needs an exchange block", name))
    })?;

    match exchange.kind {
        ExchangeKind::Http => {
            let endpoint = exchange.endpoint.as_deref().ok_or_else(|| {
                FetchError::Configuration(format!("source '{}': exchange.endpoint is required", name))
            })?;
            Ok(Arc::new(HttpExchangeApi::new(endpoint, client.clone(), call_timeout)?))
        }
        #[cfg(feature = "aws-sts")]
        ExchangeKind::AwsSts => {
            let load_timeout =
                Duration::from_millis(crate::utils::constants::DEFAULT_ACCOUNT_LOAD_TIMEOUT_MS);
            Ok(Arc::new(aws_sts::AwsStsExchangeApi::load(load_timeout).await?))
        }
        #[cfg(not(feature = "aws-sts"))]
        ExchangeKind::AwsSts => {
            Err(FetchError::Configuration(format!(
                "source '{}': aws_sts exchange requires the `aws-sts` feature",
                name
            )))
        }
    }
}

pub(crate) fn transport_error(
    provider: &'static str,
    err: reqwest::Error,
    timeout: Duration,
) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            provider,
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        let message = match std::error::Error::source(&err) {
            Some(cause) => format!("{}: {}", err, cause),
            None => err.to_string(),
        };
        FetchError::Transport { provider, message }
    }
}
