use std::io::Write;

use serial_test::serial;
use tempfile::NamedTempFile;

use crate::config::proc_loader::{file_to_config, parse_config};
use crate::config::settings::LogFormat;
use crate::config::sources::{ExchangeKind, SourceTypes};
use crate::validator::new_validator;

const FULL_CONFIG: &str = r#"
settings:
  logging:
    level: debug
    format: json
  grace_seconds: 20
  http_timeout_ms: 3000
  retry:
    attempts: 4
    base_delay_ms: 100
    max_delay_ms: 800

sources:
  ci:
    type: github_actions
    audience: ${CI_AUDIENCE:sts.amazonaws.com}
  partner:
    type: exchange
    audience: https://partner.example
    signing_algorithm: ES384
    grace_seconds: 90
    exchange:
      kind: http
      endpoint: ${EXCHANGE_ENDPOINT}

validators:
  actions:
    endpoint:
      type: github
      url: https://token.actions.githubusercontent.com/.well-known/jwks
    issuer: https://token.actions.githubusercontent.com
    audiences:
      - api://deploy
    leeway_seconds: 5
  corp:
    endpoint:
      type: oidc
      url: https://login.corp.example/.well-known/openid-configuration
    issuer: https://login.corp.example
    audiences:
      - api://deploy
      - api://audit
"#;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

#[tokio::test]
#[serial]
async fn full_config_loads_with_env_expansion() {
    std::env::set_var("EXCHANGE_ENDPOINT", "https://exchange.internal/token");
    std::env::remove_var("CI_AUDIENCE");

    let file = write_config(FULL_CONFIG);
    let config = file_to_config(file.path()).await;
    std::env::remove_var("EXCHANGE_ENDPOINT");
    let config = config.unwrap();

    let logging = config.settings.logging.as_ref().unwrap();
    assert_eq!(logging.level, "debug");
    assert_eq!(logging.format, LogFormat::Json);
    assert_eq!(config.settings.grace_seconds, Some(20));

    let ci = config.sources.get("ci").unwrap();
    assert_eq!(ci.source_type, SourceTypes::GithubActions);
    assert_eq!(ci.audience.as_deref(), Some("sts.amazonaws.com"));

    let partner = config.sources.get("partner").unwrap();
    let exchange = partner.exchange.as_ref().unwrap();
    assert_eq!(exchange.kind, ExchangeKind::Http);
    assert_eq!(exchange.endpoint.as_deref(), Some("https://exchange.internal/token"));

    let corp = config.validators.get("corp").unwrap();
    assert_eq!(corp.audiences.len(), 2);
    assert!(new_validator(corp.clone()).is_ok());
}

#[tokio::test]
#[serial]
async fn unset_variable_without_default_fails_validation() {
    std::env::remove_var("EXCHANGE_ENDPOINT");

    let file = write_config(FULL_CONFIG);
    let err = file_to_config(file.path()).await.unwrap_err().to_string();
    assert!(err.contains("config is not valid"), "{}", err);
    assert!(err.contains("sources.partner.exchange: endpoint is required"), "{}", err);
}

#[tokio::test]
async fn missing_file_names_the_path() {
    let err = file_to_config(std::path::Path::new("/definitely/not/here.yaml"))
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("/definitely/not/here.yaml"));
}

#[test]
fn every_violation_is_reported_together() {
    let err = parse_config(
        r#"
settings:
  logging:
    level: loud
    format: compact
  retry:
    attempts: 0
    base_delay_ms: 500
    max_delay_ms: 100
sources:
  broken_exchange:
    type: exchange
  confused_ci:
    type: github_actions
    signing_algorithm: RS256
validators:
  nowhere:
    endpoint:
      type: gitlab
      url: ftp://keys.example
    issuer: ""
    audiences: []
    min_key_refresh_seconds: 600
    key_cache_ttl_seconds: 60
"#,
    )
    .unwrap_err()
    .to_string();

    for expected in [
        "settings.logging.level 'loud'",
        "settings.retry.attempts must be > 0",
        "settings.retry.max_delay_ms",
        "sources.broken_exchange: audience is required",
        "sources.broken_exchange: 'exchange' block is required",
        "sources.confused_ci: 'signing_algorithm' is only valid",
        "validators.nowhere.endpoint.type 'gitlab'",
        "validators.nowhere.endpoint.url 'ftp://keys.example' must use http or https",
        "validators.nowhere: issuer cannot be empty",
        "validators.nowhere: audiences must include at least one entry",
        "validators.nowhere: min_key_refresh_seconds (600)",
    ] {
        assert!(err.contains(expected), "missing '{}' in: {}", expected, err);
    }
}

#[test]
fn empty_config_is_rejected() {
    let err = parse_config("settings: {}\n").unwrap_err().to_string();
    assert!(err.contains("at least one source or validator required"), "{}", err);
}

#[test]
fn unknown_source_type_fails_to_parse() {
    assert!(parse_config(
        r#"
sources:
  legacy:
    type: oauth2
"#
    )
    .is_err());
}
