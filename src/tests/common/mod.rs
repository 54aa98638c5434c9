// tests/common/mod.rs
pub use serde_json::json;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde_json::Value;

use crate::cache::token::Token;
use crate::errors::FetchError;
use crate::helpers::time::Clock;
use crate::sources::FetchToken;

pub const RSA_A_PEM: &str = include_str!("../fixtures/rsa_a.pem");
pub const RSA_B_PEM: &str = include_str!("../fixtures/rsa_b.pem");

/// Public moduli of the fixture keys, base64url.
pub const RSA_A_N: &str = "mzHErQHvKx7IGJouIbr4uKbYeMtFOyaeZXncqjOlW3c8qu5g8HLZmFZW-4aeAgRVGlXw_8TrG_TRP_k7NvcH5ya5yHx7u8Vrjf0rP36qE9teSG1DZNqsC_kMCJpXuRXObWqI1VQePEOA72BLAtqZJrkqq3rSrnTgwkV9t6pw-YfRMj5-96xNfuKcpgA6u8Ck9nlHxQWvULHUXEfiTPj97OtveaClvOUPhWsbPHCAvTHj5QckCdVxPPy63gmw2K9dcOjo61a3GPh2bDLztNifb_8eqUSJgYcp0n2jHe1_fNi6QG7poN5xZGLeChwHB07C_-KVQWcEllzD_kPP5E19Aw";
pub const RSA_B_N: &str = "tp6KTV1CVhCx43FC8KkfgIGEoD293fqaDhfMvr9E7t5yCYtMS1QgfyIPDyVM-wNUmwHblG7P_gZYUDoKsGD8iQ2VQY_rr58UHdcoW5zoCp9XmW9e6-Y_RJesoqf71bzHHElD6X0xS5zZA3pk9czZItUXADKDJw8980vk_pNuIP0q7L_WT02gj6QHdkofKC3a9O8KXqP4kcAoe6QMhvwaBWbyGO7Y2Vh4ELN8Ey98k3SPzoMXcexWCtAXoDV9QJ4CREKsWFyLxoGqILtM6cF2JaWL7CcsObz0b17zj06bFuVnKdP9TnBzWQiH24NkXgS2IKufX90zcyp8MTK8fW605Q";

pub fn rsa_jwk(kid: &str, n: &str) -> Value {
    json!({"kty": "RSA", "kid": kid, "alg": "RS256", "use": "sig", "n": n, "e": "AQAB"})
}

pub fn key_set(keys: Vec<Value>) -> Value {
    json!({ "keys": keys })
}

/// RS256-sign `claims` with a fixture key.
pub fn sign_rs256(kid: &str, pem: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_owned());
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("fixture key");
    encode(&header, claims, &key).expect("sign")
}

/// Compact token with an arbitrary header and a junk signature.
pub fn forge(header: &Value, claims: &Value) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        URL_SAFE_NO_PAD.encode("not-a-signature")
    )
}

/// Unsigned token whose payload carries only `exp`.
pub fn jwt_expiring_at(exp: DateTime<Utc>) -> String {
    forge(&json!({"alg": "RS256", "typ": "JWT"}), &json!({"exp": exp.timestamp()}))
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

/// Clock the test moves by hand.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn advance(&self, secs: i64) {
        let mut now = self.now.lock().unwrap();
        *now += ChronoDuration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Fixed instant so expiry arithmetic in tests is exact.
pub fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(1_900_000_000, 0).unwrap()
}

/// Provider double that replays scripted outcomes and counts calls.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<Token, FetchError>>>,
    calls: AtomicUsize,
    delay: Duration,
    grace: Duration,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<Result<Token, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            grace: Duration::from_secs(30),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push(&self, outcome: Result<Token, FetchError>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FetchToken for ScriptedFetcher {
    fn provider(&self) -> &'static str {
        "scripted"
    }

    fn grace_window(&self) -> Duration {
        self.grace
    }

    async fn fetch(&self) -> Result<Token, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Err(FetchError::InvalidResponse {
                provider: "scripted",
                message: "script exhausted".into(),
            })
        })
    }
}

pub fn provider_down() -> FetchError {
    FetchError::Status {
        provider: "scripted",
        status: 503,
        body: "unavailable".into(),
    }
}
