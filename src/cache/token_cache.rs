use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::flight::Flight;
use crate::cache::token::Token;
use crate::errors::FetchError;
use crate::helpers::time::{Clock, SystemClock};
use crate::sources::FetchToken;
use crate::utils::constants::DEFAULT_REFRESH_BACKOFF_SECS;

/// The capability handed to calling middleware: obtain a currently valid token.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> impl Future<Output = Result<Token, FetchError>> + Send;
}

#[derive(Default)]
struct CacheState {
    current: Option<Token>,
    in_flight: Option<Flight<Token, FetchError>>,
    last_failure: Option<DateTime<Utc>>,
}

impl CacheState {
    fn backing_off(&self, now: DateTime<Utc>, backoff: Duration) -> bool {
        let backoff = ChronoDuration::from_std(backoff).unwrap_or(ChronoDuration::MAX);
        self.last_failure
            .and_then(|failed_at| failed_at.checked_add_signed(backoff))
            .is_some_and(|retry_at| now < retry_at)
    }
}

/// Serves a cached token until it enters the grace window, then refreshes it
/// through a single in-flight fetch shared by every concurrent caller.
pub struct TokenCache<F> {
    fetcher: Arc<F>,
    grace: Duration,
    refresh_backoff: Duration,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<CacheState>>,
}

impl<F> Clone for TokenCache<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            grace: self.grace,
            refresh_backoff: self.refresh_backoff,
            clock: self.clock.clone(),
            state: self.state.clone(),
        }
    }
}

impl<F> TokenCache<F>
where
    F: FetchToken + 'static,
{
    /// Cache with the provider's default grace window.
    pub fn new(fetcher: F) -> Self {
        let grace = fetcher.grace_window();
        Self {
            fetcher: Arc::new(fetcher),
            grace,
            refresh_backoff: Duration::from_secs(DEFAULT_REFRESH_BACKOFF_SECS),
            clock: Arc::new(SystemClock),
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// How long a still-valid token keeps being served after a failed refresh
    /// before the provider is asked again.
    pub fn with_refresh_backoff(mut self, refresh_backoff: Duration) -> Self {
        self.refresh_backoff = refresh_backoff;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Last successfully fetched token, whatever its age.
    pub async fn cached(&self) -> Option<Token> {
        self.state.lock().await.current.clone()
    }

    pub async fn get(&self) -> Result<Token, FetchError> {
        let flight = {
            let mut state = self.state.lock().await;
            let now = self.clock.now();

            if let Some(token) = state.current.as_ref() {
                if token.is_fresh(now, self.grace) {
                    debug!(provider = self.fetcher.provider(), "token cache hit");
                    return Ok(token.clone());
                }
                if token.is_unexpired(now) && state.backing_off(now, self.refresh_backoff) {
                    debug!(
                        provider = self.fetcher.provider(),
                        expires_at = %token.expiry(),
                        "refresh recently failed, serving cached token"
                    );
                    return Ok(token.clone());
                }
            }

            match &state.in_flight {
                Some(flight) => {
                    debug!(provider = self.fetcher.provider(), waiters = flight.waiters(), "joining in-flight refresh");
                    flight.clone()
                }
                None => {
                    let flight = self.launch();
                    state.in_flight = Some(flight.clone());
                    flight
                }
            }
        };

        let result = flight.clone().wait().await;
        if let Err(FetchError::Aborted(_)) = &result {
            // the refresh task died before it could clear its own slot
            let mut state = self.state.lock().await;
            if state.in_flight.as_ref().is_some_and(|f| f.same_as(&flight)) {
                state.in_flight = None;
            }
        }
        result
    }

    fn launch(&self) -> Flight<Token, FetchError> {
        let fetcher = self.fetcher.clone();
        let state = self.state.clone();
        let clock = self.clock.clone();

        Flight::spawn(async move {
            let provider = fetcher.provider();
            let started = Instant::now();
            info!(provider, "refreshing token");

            let result = fetcher.fetch().await;

            let mut state = state.lock().await;
            state.in_flight = None;
            match &result {
                Ok(token) => {
                    info!(
                        provider,
                        expires_at = %token.expiry(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "token refreshed"
                    );
                    state.current = Some(token.clone());
                    state.last_failure = None;
                }
                Err(err) => {
                    warn!(
                        provider,
                        error = %err,
                        retriable = err.is_retriable(),
                        has_cached = state.current.is_some(),
                        "token refresh failed"
                    );
                    state.last_failure = Some(clock.now());
                }
            }
            result
        })
    }
}

impl<F> TokenSource for TokenCache<F>
where
    F: FetchToken + 'static,
{
    async fn token(&self) -> Result<Token, FetchError> {
        self.get().await
    }
}
