//! Shared constants and invariants

/// Grace window used when neither the source, the settings nor the provider say otherwise.
pub const DEFAULT_GRACE_SECS: u64 = 10;
pub const GITHUB_ACTIONS_GRACE_SECS: u64 = 30;
pub const EXCHANGE_GRACE_SECS: u64 = 60;

/// After a failed refresh, a still-valid cached token is served for this long
/// before the provider is asked again.
pub const DEFAULT_REFRESH_BACKOFF_SECS: u64 = 5;

pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5000;
/// Exchange calls stay well below any realistic caller deadline.
pub const DEFAULT_EXCHANGE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_ACCOUNT_LOAD_TIMEOUT_MS: u64 = 5000;

pub const DEFAULT_SIGNING_ALGORITHM: &str = "RS256";

// Ambient metadata environment contract (GitHub Actions)
pub const ACTIONS_ID_TOKEN_REQUEST_TOKEN: &str = "ACTIONS_ID_TOKEN_REQUEST_TOKEN";
pub const ACTIONS_ID_TOKEN_REQUEST_URL: &str = "ACTIONS_ID_TOKEN_REQUEST_URL";

// Key sets
pub const DEFAULT_KEY_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_MIN_KEY_REFRESH_SECS: u64 = 10;
pub const MAX_JWT_SIZE_BYTES: usize = 8192;
