use std::fmt::Display;
use std::future::Future;

use tokio::time::{sleep, Duration};
use tracing::{error, warn};

use crate::config::settings::RetryConfig;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
        }
    }
}

impl From<Option<&RetryConfig>> for RetrySettings {
    fn from(config: Option<&RetryConfig>) -> Self {
        let defaults = RetrySettings::default();
        match config {
            None => defaults,
            Some(c) => Self {
                attempts: c.attempts.unwrap_or(defaults.attempts).max(1),
                base_delay_ms: c.base_delay_ms.unwrap_or(defaults.base_delay_ms),
                max_delay_ms: c.max_delay_ms.unwrap_or(defaults.max_delay_ms),
            },
        }
    }
}

impl RetrySettings {
    /// Run `operation` up to `attempts` times, doubling the delay between
    /// attempts up to `max_delay_ms`. Errors `is_retriable` rejects are
    /// returned at once.
    pub async fn run_with_retry<F, Fut, T, E, R>(&self, mut operation: F, is_retriable: R) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        R: Fn(&E) -> bool,
    {
        let attempts = self.attempts.max(1);
        let mut delay = self.base_delay_ms;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !is_retriable(&e) => {
                    error!("attempt {attempt}/{attempts} failed, not retriable: {e}");
                    return Err(e);
                }
                Err(e) if attempt < attempts => {
                    warn!("attempt {attempt}/{attempts} failed: {e}");
                    sleep(Duration::from_millis(delay)).await;
                    delay = (delay.saturating_mul(2)).min(self.max_delay_ms);
                    attempt += 1;
                }
                Err(e) => {
                    error!("all {attempt} attempts failed: {e}");
                    return Err(e);
                }
            }
        }
    }
}
