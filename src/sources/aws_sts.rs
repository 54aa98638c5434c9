//! STS `GetWebIdentityToken` through the AWS SDK (feature `aws-sts`).

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use chrono::DateTime;
use tracing::{debug, info};

use crate::errors::FetchError;
use crate::sources::exchange::{ExchangeApi, ExchangeRequest, ExchangeResponse};

const PROVIDER: &str = "aws_sts";

#[derive(Debug, Clone)]
pub struct AwsStsExchangeApi {
    client: aws_sdk_sts::Client,
}

impl AwsStsExchangeApi {
    /// Load ambient account configuration (credentials chain, region) from the
    /// environment. Loading can probe instance metadata, so it is bounded.
    pub async fn load(load_timeout: Duration) -> Result<Self, FetchError> {
        debug!(timeout_ms = load_timeout.as_millis() as u64, "loading aws account configuration");
        let sdk_config = tokio::time::timeout(
            load_timeout,
            aws_config::defaults(BehaviorVersion::latest()).load(),
        )
        .await
        .map_err(|_| {
            FetchError::Configuration(format!(
                "aws account configuration not loaded within {}ms",
                load_timeout.as_millis()
            ))
        })?;

        if sdk_config.region().is_none() {
            return Err(FetchError::Configuration(
                "aws region could not be resolved from the environment".into(),
            ));
        }
        info!(region = ?sdk_config.region(), "aws account configuration loaded");

        Ok(Self::from_client(aws_sdk_sts::Client::new(&sdk_config)))
    }

    pub fn from_client(client: aws_sdk_sts::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExchangeApi for AwsStsExchangeApi {
    async fn exchange(&self, request: &ExchangeRequest) -> Result<ExchangeResponse, FetchError> {
        let output = self
            .client
            .get_web_identity_token()
            .set_audience(Some(request.audience.clone()))
            .signing_algorithm(request.signing_algorithm.clone())
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                provider: PROVIDER,
                message: aws_sdk_sts::error::DisplayErrorContext(&e).to_string(),
            })?;

        let expiration = output
            .expiration()
            .and_then(|exp| DateTime::from_timestamp(exp.secs(), exp.subsec_nanos()));

        Ok(ExchangeResponse {
            token: output.web_identity_token().map(str::to_owned),
            expiration,
        })
    }
}
