use std::path::PathBuf;

use crate::consts::{APP_NAME, ENV_DATA_DIR};

fn env_path(var: &str) -> Option<PathBuf> {
  std::env::var_os(var).filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> Option<PathBuf> {
  env_path("USERPROFILE")
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> Option<PathBuf> {
  env_path("HOME")
}

/// Returns the directory for configuration files for the application
#[cfg(windows)]
pub fn config_dir() -> Option<PathBuf> {
  env_path("APPDATA").map(|dir| dir.join(APP_NAME))
}

/// Returns the directory for configuration files for the application
#[cfg(not(windows))]
pub fn config_dir() -> Option<PathBuf> {
  let config_home = env_path("XDG_CONFIG_HOME").or_else(|| home_dir().map(|home| home.join(".config")))?;
  Some(config_home.join(APP_NAME))
}

/// Returns the directory for data files for the application.
///
/// `CONVERGE_DATA_DIR` overrides the platform location.
#[cfg(windows)]
pub fn data_dir() -> Option<PathBuf> {
  env_path(ENV_DATA_DIR).or_else(|| env_path("LOCALAPPDATA").map(|dir| dir.join(APP_NAME)))
}

/// Returns the directory for data files for the application.
///
/// `CONVERGE_DATA_DIR` overrides the platform location.
#[cfg(not(windows))]
pub fn data_dir() -> Option<PathBuf> {
  if let Some(dir) = env_path(ENV_DATA_DIR) {
    return Some(dir);
  }
  let data_home =
    env_path("XDG_DATA_HOME").or_else(|| home_dir().map(|home| home.join(".local").join("share")))?;
  Some(data_home.join(APP_NAME))
}
