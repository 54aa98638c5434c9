use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Bearer,
}

/// An issued ID token. Immutable once built; callers get clones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    value: String,
    token_type: TokenType,
    expiry: DateTime<Utc>,
}

impl Token {
    pub fn bearer(value: String, expiry: DateTime<Utc>) -> Self {
        Self {
            value,
            token_type: TokenType::Bearer,
            expiry,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    /// Expiry is further away than `grace`.
    pub fn is_fresh(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        let grace = ChronoDuration::from_std(grace).unwrap_or(ChronoDuration::MAX);
        match now.checked_add_signed(grace) {
            Some(refresh_at) => refresh_at < self.expiry,
            None => false,
        }
    }

    /// Not yet past its expiry.
    pub fn is_unexpired(&self, now: DateTime<Utc>) -> bool {
        now < self.expiry
    }

    /// Value formatted for an `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.value)
    }
}
