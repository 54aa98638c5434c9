use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use tokio::io::AsyncReadExt;
use tracing::info;

use token_federation::config::proc_loader::file_to_config;
use token_federation::errors::FetchError;
use token_federation::resilience::retry::RetrySettings;
use token_federation::sources::build_token_source;
use token_federation::utils::logging::{self, LogLevel};
use token_federation::{new_validator, ServiceConfig, TokenSource};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "token-federation.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Acquire a token from a configured source and print it
    Fetch {
        source: String,
        /// Print value, type and expiry as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a token against a configured validator and print its claims
    Validate {
        validator: String,
        /// Token to validate; read from stdin when absent
        #[arg(long)]
        token: Option<String>,
    },
    /// Load and validate the configuration file
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // -------------------------------
    // 1. Load YAML config
    // -------------------------------

    let service_config = file_to_config(Path::new(&args.config))
        .await
        .with_context(|| format!("loading config {}", args.config))?;
    logging::run(&service_config, args.log_level);

    // -------------------------------
    // 2. Run the command
    // -------------------------------

    match args.command {
        Command::Fetch { source, json } => fetch(&service_config, &source, json).await,
        Command::Validate { validator, token } => validate(&service_config, &validator, token).await,
        Command::CheckConfig => {
            println!(
                "config ok: {} source(s), {} validator(s)",
                service_config.sources.len(),
                service_config.validators.len()
            );
            Ok(())
        }
    }
}

async fn fetch(service_config: &ServiceConfig, name: &str, json: bool) -> Result<()> {
    let source_config = service_config
        .sources
        .get(name)
        .ok_or_else(|| anyhow!("no source named '{}' in config", name))?;

    let client = Client::new();
    let cache = build_token_source(name, source_config, &service_config.settings, &client)
        .await
        .with_context(|| format!("building source '{}'", name))?;

    let retry = RetrySettings::from(service_config.settings.retry.as_ref());
    let token = retry
        .run_with_retry(|| cache.token(), FetchError::is_retriable)
        .await
        .with_context(|| format!("fetching token from source '{}'", name))?;

    info!(source = name, expires_at = %token.expiry(), "token acquired");
    if json {
        println!("{}", serde_json::to_string_pretty(&token)?);
    } else {
        println!("{}", token.value());
    }
    Ok(())
}

async fn validate(service_config: &ServiceConfig, name: &str, token: Option<String>) -> Result<()> {
    let validator_config = service_config
        .validators
        .get(name)
        .ok_or_else(|| anyhow!("no validator named '{}' in config", name))?;

    let token = match token {
        Some(token) => token,
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("reading token from stdin")?;
            buf
        }
    };
    let token = token.trim();
    if token.is_empty() {
        bail!("no token given");
    }

    let validator = new_validator(validator_config.clone())
        .with_context(|| format!("building validator '{}'", name))?;

    match validator.validate(token).await {
        Ok(claims) => {
            println!("{}", serde_json::to_string_pretty(&claims)?);
            Ok(())
        }
        Err(err) => Err(anyhow!(
            "token rejected by validator '{}' (check: {}, status: {}): {}",
            name,
            err.check(),
            err.status_code(),
            err
        )),
    }
}
