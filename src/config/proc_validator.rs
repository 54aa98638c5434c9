//! Configuration validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - Covers settings (retry, logging, timeouts), sources and validators

use reqwest::Url;
use tracing::{error, info};

use crate::config::settings::{RetryConfig, SettingsConfig};
use crate::config::sources::{ExchangeKind, ServiceConfig, SourceConfig, SourceTypes};
use crate::config::validators::ValidatorConfig;
use crate::validator::EndpointType;

const MAX_GRACE_SECONDS: u64 = 60 * 60 * 24;

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);

    if cfg.sources.is_empty() && cfg.validators.is_empty() {
        errors.push("config: at least one source or validator required".to_string());
    }

    for (name, src_cfg) in &cfg.sources {
        validate_source(name, src_cfg, &mut errors);
    }
    for (name, validator_cfg) in &cfg.validators {
        validate_validator(name, validator_cfg, &mut errors);
    }

    if errors.is_empty() {
        info!(
            sources = cfg.sources.len(),
            validators = cfg.validators.len(),
            "config is valid"
        );
        Ok(())
    } else {
        for e in &errors {
            error!("config: {}", e);
        }
        Err(errors)
    }
}

fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    if let Some(retry) = &settings.retry {
        validate_retry("settings.retry", retry, errors);
    }

    if let Some(s) = settings.grace_seconds {
        validate_grace("settings.grace_seconds", s, errors);
    }
    if settings.http_timeout_ms == Some(0) {
        errors.push("settings.http_timeout_ms must be > 0".to_string());
    }

    if let Some(logging) = &settings.logging {
        let valid = ["trace", "debug", "info", "warn", "error"];
        if !valid.contains(&logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "settings.logging.level '{}' invalid; allowed: {:?}",
                logging.level, valid
            ));
        }
    }
}

fn validate_retry(path: &str, retry: &RetryConfig, errors: &mut Vec<String>) {
    if let Some(attempts) = retry.attempts {
        if attempts == 0 {
            errors.push(format!("{}.attempts must be > 0", path));
        }
    }
    if let (Some(base), Some(max)) = (retry.base_delay_ms, retry.max_delay_ms) {
        if max < base {
            errors.push(format!(
                "{}.max_delay_ms ({}) must be >= base_delay_ms ({})",
                path, max, base
            ));
        }
    }
}

fn validate_grace(path: &str, seconds: u64, errors: &mut Vec<String>) {
    if seconds > MAX_GRACE_SECONDS {
        errors.push(format!("{} ({}) is unreasonably large", path, seconds));
    }
}

fn validate_source(name: &str, src_cfg: &SourceConfig, errors: &mut Vec<String>) {
    if let Some(s) = src_cfg.grace_seconds {
        validate_grace(&format!("sources.{}.grace_seconds", name), s, errors);
    }
    if src_cfg.timeout_ms == Some(0) {
        errors.push(format!("sources.{}: timeout_ms must be > 0", name));
    }
    if src_cfg.audience.as_deref().is_some_and(|a| a.trim().is_empty()) {
        errors.push(format!("sources.{}: audience must not be blank when set", name));
    }

    match src_cfg.source_type {
        SourceTypes::GithubActions => {
            if src_cfg.exchange.is_some() {
                errors.push(format!(
                    "sources.{}: 'exchange' block is only valid for type 'exchange'",
                    name
                ));
            }
            if src_cfg.signing_algorithm.is_some() {
                errors.push(format!(
                    "sources.{}: 'signing_algorithm' is only valid for type 'exchange'",
                    name
                ));
            }
        }
        SourceTypes::Exchange => {
            if src_cfg.audience.is_none() {
                errors.push(format!("sources.{}: audience is required for type 'exchange'", name));
            }
            if src_cfg
                .signing_algorithm
                .as_deref()
                .is_some_and(|alg| alg.trim().is_empty())
            {
                errors.push(format!("sources.{}: signing_algorithm must not be blank", name));
            }
            match &src_cfg.exchange {
                None => errors.push(format!(
                    "sources.{}: 'exchange' block is required for type 'exchange'",
                    name
                )),
                Some(exchange) => match (exchange.kind, exchange.endpoint.as_deref()) {
                    (ExchangeKind::Http, None) => errors.push(format!(
                        "sources.{}.exchange: endpoint is required for kind 'http'",
                        name
                    )),
                    (ExchangeKind::Http, Some(endpoint)) => validate_http_url(
                        &format!("sources.{}.exchange.endpoint", name),
                        endpoint,
                        errors,
                    ),
                    (ExchangeKind::AwsSts, Some(_)) => errors.push(format!(
                        "sources.{}.exchange: endpoint is not used by kind 'aws_sts'",
                        name
                    )),
                    (ExchangeKind::AwsSts, None) => {}
                },
            }
        }
    }
}

fn validate_validator(name: &str, cfg: &ValidatorConfig, errors: &mut Vec<String>) {
    if cfg.endpoint.endpoint_type.parse::<EndpointType>().is_err() {
        errors.push(format!(
            "validators.{}.endpoint.type '{}' invalid; allowed: {:?}",
            name,
            cfg.endpoint.endpoint_type,
            EndpointType::NAMES
        ));
    }
    validate_http_url(&format!("validators.{}.endpoint.url", name), &cfg.endpoint.url, errors);

    if cfg.issuer.trim().is_empty() {
        errors.push(format!("validators.{}: issuer cannot be empty", name));
    }
    if cfg.audiences.is_empty() {
        errors.push(format!("validators.{}: audiences must include at least one entry", name));
    }
    if cfg.audiences.iter().any(|a| a.trim().is_empty()) {
        errors.push(format!("validators.{}: audiences must not contain blank entries", name));
    }

    if cfg.request_timeout_ms == Some(0) {
        errors.push(format!("validators.{}: request_timeout_ms must be > 0", name));
    }
    if cfg.key_cache_ttl_seconds == Some(0) {
        errors.push(format!("validators.{}: key_cache_ttl_seconds must be > 0", name));
    }
    if let (Some(min_refresh), Some(ttl)) = (cfg.min_key_refresh_seconds, cfg.key_cache_ttl_seconds) {
        if min_refresh > ttl {
            errors.push(format!(
                "validators.{}: min_key_refresh_seconds ({}) must be <= key_cache_ttl_seconds ({})",
                name, min_refresh, ttl
            ));
        }
    }
}

fn validate_http_url(path: &str, raw: &str, errors: &mut Vec<String>) {
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(format!(
            "{} '{}' must use http or https, not '{}'",
            path,
            raw,
            url.scheme()
        )),
        Err(e) => errors.push(format!("{} '{}' is not a valid URL: {}", path, raw, e)),
    }
}
