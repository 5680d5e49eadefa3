//! Crate-wide constants.

/// Application name, used for config/data directory names.
pub const APP_NAME: &str = "converge";

/// Length of the truncated hash used for state file names.
pub const STATE_KEY_HASH_LEN: usize = 20;

/// Default `User-Agent` header sent by the HTTP transport.
pub const DEFAULT_USER_AGENT: &str = concat!("converge/", env!("CARGO_PKG_VERSION"));

/// Environment variable overriding the service base URL.
pub const ENV_BASE_URL: &str = "CONVERGE_BASE_URL";

/// Environment variable carrying a bearer token.
pub const ENV_TOKEN: &str = "CONVERGE_TOKEN";

/// Environment variable carrying an API key.
pub const ENV_API_KEY: &str = "CONVERGE_API_KEY";

/// Environment variable overriding the per-request timeout (e.g. `"30s"`).
pub const ENV_TIMEOUT: &str = "CONVERGE_TIMEOUT";

/// Environment variable overriding the data directory.
pub const ENV_DATA_DIR: &str = "CONVERGE_DATA_DIR";

/// Header used for API-key authentication when none is configured.
pub const DEFAULT_API_KEY_HEADER: &str = "x-api-key";
