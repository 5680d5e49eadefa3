//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Isolated test environment.
///
/// Each test gets its own temporary directory for config, stored state and
/// manifests, and talks to its own mock server.
pub struct TestEnv {
  pub temp: TempDir,
  pub base_url: String,
}

impl TestEnv {
  pub fn new(base_url: String) -> Self {
    Self {
      temp: TempDir::new().unwrap(),
      base_url,
    }
  }

  /// Write a manifest into the temp directory and return its path.
  pub fn manifest(&self, name: &str, content: &str) -> PathBuf {
    let path = self.temp.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
  }

  /// Directory holding stored states.
  pub fn state_dir(&self) -> PathBuf {
    self.temp.path().join("data").join("state")
  }

  /// Get a pre-configured Command for the converge binary.
  ///
  /// Sets environment variables for isolated testing:
  /// - `CONVERGE_BASE_URL`: the mock server
  /// - `CONVERGE_TOKEN`: a fixed bearer token
  /// - `CONVERGE_DATA_DIR`: isolated stored state
  /// - `XDG_CONFIG_HOME`: no config file
  pub fn converge_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("converge");
    cmd.env("CONVERGE_BASE_URL", &self.base_url);
    cmd.env("CONVERGE_TOKEN", "test-token");
    cmd.env("CONVERGE_DATA_DIR", self.temp.path().join("data"));
    cmd.env("XDG_CONFIG_HOME", self.temp.path().join("config"));
    cmd.env_remove("CONVERGE_API_KEY");
    cmd.env_remove("CONVERGE_TIMEOUT");
    cmd
  }
}
