//! CLI smoke tests for converge.
//!
//! These tests run every command without a remote server and check the
//! exit codes and the messages of failures that happen before any request.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Minimal role manifest; the role has no id yet, so nothing is fetched.
const ROLE_MANIFEST: &str = r#"{
  "kind": "iam.Role",
  "key": "readers",
  "spec": {
    "account_id": "acct",
    "name": "Reader",
    "service_name": "svc",
    "display_name": "Reader",
    "actions": ["svc.read"]
  }
}"#;

/// Command isolated from the user's config, data and credentials.
fn converge_cmd(temp: &TempDir) -> Command {
  let mut cmd = cargo_bin_cmd!("converge");
  cmd.env("XDG_CONFIG_HOME", temp.path().join("config"));
  cmd.env("CONVERGE_DATA_DIR", temp.path().join("data"));
  for var in ["CONVERGE_BASE_URL", "CONVERGE_TOKEN", "CONVERGE_API_KEY", "CONVERGE_TIMEOUT", "RUST_LOG"] {
    cmd.env_remove(var);
  }
  cmd
}

fn write_manifest(temp: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
  let path = temp.path().join(name);
  std::fs::write(&path, content).unwrap();
  path
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  let temp = TempDir::new().unwrap();
  converge_cmd(&temp)
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  let temp = TempDir::new().unwrap();
  converge_cmd(&temp)
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("converge"));
}

#[test]
fn subcommand_help_works() {
  let temp = TempDir::new().unwrap();
  for cmd in &["schemas", "plan", "apply", "get", "delete", "list"] {
    converge_cmd(&temp)
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

// =============================================================================
// schemas
// =============================================================================

#[test]
fn schemas_lists_builtin_kinds() {
  let temp = TempDir::new().unwrap();
  converge_cmd(&temp)
    .arg("schemas")
    .assert()
    .success()
    .stdout(predicate::str::contains("firebaserules.Release"))
    .stdout(predicate::str::contains("firebaserules.Ruleset"))
    .stdout(predicate::str::contains("iam.Policy"))
    .stdout(predicate::str::contains("iam.Role"));
}

#[test]
fn schemas_json_is_parseable() {
  let temp = TempDir::new().unwrap();
  let output = converge_cmd(&temp).args(["--json", "schemas"]).output().unwrap();
  assert!(output.status.success());
  let kinds: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let role = kinds
    .as_array()
    .unwrap()
    .iter()
    .find(|k| k["kind"] == "iam.Role")
    .unwrap();
  assert_eq!(role["update_operations"], serde_json::json!(["replaceRole"]));
}

// =============================================================================
// Manifest errors
// =============================================================================

#[test]
fn missing_manifest_fails() {
  let temp = TempDir::new().unwrap();
  converge_cmd(&temp)
    .args(["plan", "/nonexistent/path/role.json"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to read manifest"));
}

#[test]
fn unknown_kind_fails() {
  let temp = TempDir::new().unwrap();
  let path = write_manifest(&temp, "thing.json", r#"{"kind":"nope.Thing","spec":{}}"#);
  converge_cmd(&temp)
    .arg("apply")
    .arg(&path)
    .assert()
    .failure()
    .stderr(predicate::str::contains("nope.Thing"));
}

#[test]
fn missing_required_field_fails_before_any_request() {
  let temp = TempDir::new().unwrap();
  let path = write_manifest(&temp, "role.json", r#"{"kind":"iam.Role","spec":{"account_id":"acct"}}"#);
  converge_cmd(&temp)
    .arg("apply")
    .arg(&path)
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid desired state"));
}

// =============================================================================
// apply
// =============================================================================

#[test]
fn block_creation_rejects_unknown_resource() {
  let temp = TempDir::new().unwrap();
  let path = write_manifest(&temp, "role.json", ROLE_MANIFEST);
  converge_cmd(&temp)
    .arg("apply")
    .arg(&path)
    .arg("--block-creation")
    .assert()
    .failure()
    .stderr(predicate::str::contains("BlockCreation"));
}

// =============================================================================
// delete
// =============================================================================

#[test]
fn delete_without_force_refuses_non_interactive() {
  let temp = TempDir::new().unwrap();
  let path = write_manifest(&temp, "role.json", ROLE_MANIFEST);
  converge_cmd(&temp)
    .arg("delete")
    .arg(&path)
    .assert()
    .failure()
    .stderr(predicate::str::contains("--force"));
}
