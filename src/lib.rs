//! # Token Federation Library
//!
//! Acquires short-lived ID tokens from ambient workload-identity providers
//! and validates ID tokens issued by third parties.
//!
//! Modules:
//! - `config`: YAML configuration, env expansion and aggregated validation
//! - `cache`: token value type and the single-flight token cache
//! - `sources`: ambient metadata and exchange providers
//! - `parser`: unverified expiry extraction from compact JWTs
//! - `validator`: key-set resolution and token validation

pub mod cache;
pub mod config;
pub mod errors;
pub mod helpers;
pub mod parser;
pub mod resilience;
pub mod sources;
pub mod utils;
pub mod validator;

#[cfg(test)]
mod tests;

pub use crate::cache::token::{Token, TokenType};
pub use crate::cache::token_cache::{TokenCache, TokenSource};
pub use crate::config::sources::ServiceConfig;
pub use crate::config::validators::{EndpointConfig, ValidatorConfig};
pub use crate::errors::{ConfigError, DecodeError, FetchError, ValidationError};
pub use crate::parser::unverified::decode_unverified;
pub use crate::validator::claims::Claims;
pub use crate::validator::{new_validator, new_validator_with, EndpointType, ValidateToken, Validator};
