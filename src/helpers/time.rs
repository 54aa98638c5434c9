use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::time::Duration;

/// Source of "now" for expiry and claim checks.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Resolve a grace window: source level, then settings (global) level, then
/// the provider default.
pub fn get_grace_window(
    grace_seconds_settings: Option<u64>,
    grace_seconds_source: Option<u64>,
    provider_default: Duration,
) -> Duration {
    grace_seconds_source
        .or(grace_seconds_settings)
        .map(Duration::from_secs)
        .unwrap_or(provider_default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_grace_wins_over_settings() {
        let default = Duration::from_secs(30);
        assert_eq!(get_grace_window(Some(20), Some(5), default), Duration::from_secs(5));
        assert_eq!(get_grace_window(Some(20), None, default), Duration::from_secs(20));
        assert_eq!(get_grace_window(None, None, default), default);
    }
}
