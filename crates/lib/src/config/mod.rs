//! Client configuration.
//!
//! Loaded from a TOML file (by default `config.toml` in the platform config
//! directory), then overridden by `CONVERGE_*` environment variables.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{
  DEFAULT_API_KEY_HEADER, DEFAULT_USER_AGENT, ENV_API_KEY, ENV_BASE_URL, ENV_TIMEOUT, ENV_TOKEN,
};
use crate::platform::paths::config_dir;
use crate::transport::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid value for {var}: {message}")]
  InvalidEnv { var: &'static str, message: String },
}

/// Request authentication.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Auth {
  /// `Authorization: Bearer <token>`.
  Bearer { token: String },
  /// API key sent in a custom header.
  ApiKey {
    #[serde(default = "default_api_key_header")]
    header: String,
    key: String,
  },
}

fn default_api_key_header() -> String {
  DEFAULT_API_KEY_HEADER.to_string()
}

impl fmt::Debug for Auth {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Auth::Bearer { .. } => f.debug_struct("Bearer").field("token", &"<redacted>").finish(),
      Auth::ApiKey { header, .. } => f
        .debug_struct("ApiKey")
        .field("header", header)
        .field("key", &"<redacted>")
        .finish(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
  /// Overrides every schema's base URL when set.
  pub base_url: Option<String>,
  pub auth: Option<Auth>,
  /// Per-request timeout.
  #[serde(with = "crate::util::duration")]
  pub timeout: Duration,
  /// Deadline for a whole apply, including conflict retries.
  #[serde(with = "crate::util::duration::option")]
  pub apply_timeout: Option<Duration>,
  pub retry: RetryPolicy,
  /// Times a conflicting apply is restarted from discovery.
  pub conflict_retries: u32,
  pub user_agent: String,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      base_url: None,
      auth: None,
      timeout: Duration::from_secs(30),
      apply_timeout: Some(Duration::from_secs(20 * 60)),
      retry: RetryPolicy::default(),
      conflict_retries: 3,
      user_agent: DEFAULT_USER_AGENT.to_string(),
    }
  }
}

impl ClientConfig {
  /// Default config file location.
  pub fn default_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
  }

  /// Load from `path` (which must exist) or from the default location (which
  /// may be missing), then apply environment overrides.
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    let mut config = match path {
      Some(path) => Self::from_file(path)?,
      None => match Self::default_path() {
        Some(path) if path.exists() => Self::from_file(&path)?,
        _ => Self::default(),
      },
    };
    config.apply_env()?;
    Ok(config)
  }

  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    debug!(path = %path.display(), "loaded config");
    Ok(config)
  }

  /// Apply `CONVERGE_*` environment overrides. A token takes precedence over an API key.
  pub fn apply_env(&mut self) -> Result<(), ConfigError> {
    if let Some(url) = env_var(ENV_BASE_URL) {
      self.base_url = Some(url);
    }
    if let Some(key) = env_var(ENV_API_KEY) {
      let header = match &self.auth {
        Some(Auth::ApiKey { header, .. }) => header.clone(),
        _ => default_api_key_header(),
      };
      self.auth = Some(Auth::ApiKey { header, key });
    }
    if let Some(token) = env_var(ENV_TOKEN) {
      self.auth = Some(Auth::Bearer { token });
    }
    if let Some(timeout) = env_var(ENV_TIMEOUT) {
      self.timeout = humantime::parse_duration(&timeout).map_err(|e| ConfigError::InvalidEnv {
        var: ENV_TIMEOUT,
        message: e.to_string(),
      })?;
    }
    Ok(())
  }
}

fn env_var(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|v| !v.is_empty())
}
