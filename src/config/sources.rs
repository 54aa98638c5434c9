use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::settings::SettingsConfig;
use crate::config::validators::ValidatorConfig;

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub sources: HashMap<String, SourceConfig>,
    #[serde(default)]
    pub validators: HashMap<String, ValidatorConfig>,
}

/// ================================
/// Sources
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub source_type: SourceTypes,
    /// Audience requested for the issued token.
    pub audience: Option<String>,
    /// Exchange sources only; defaults to RS256.
    pub signing_algorithm: Option<String>,
    pub grace_seconds: Option<u64>,
    /// Per-call timeout; metadata sources fall back to settings.http_timeout_ms.
    pub timeout_ms: Option<u64>,
    pub exchange: Option<ExchangeConfig>,
}

#[derive(Debug, Deserialize, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceTypes {
    GithubActions,
    Exchange,
}

/// Which exchange API backs an `exchange` source.
#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    pub kind: ExchangeKind,
    /// Required for `http`.
    pub endpoint: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    Http,
    AwsSts,
}
