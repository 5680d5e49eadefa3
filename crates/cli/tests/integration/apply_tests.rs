//! End-to-end command tests against a mock IAM server.

use mockito::{Matcher, Server};
use predicates::prelude::*;

use crate::common::TestEnv;

const ROLE_BODY: &str = r#"{
  "id": "role1",
  "account_id": "acct",
  "name": "Reader",
  "service_name": "svc",
  "display_name": "Reader",
  "actions": ["svc.read"],
  "crn": "crn:v1:role1"
}"#;

fn role_manifest(display_name: &str) -> String {
  format!(
    r#"{{
      "kind": "iam.Role",
      "key": "readers",
      "spec": {{
        "account_id": "acct",
        "name": "Reader",
        "service_name": "svc",
        "display_name": "{}",
        "actions": ["svc.read"]
      }}
    }}"#,
    display_name
  )
}

fn plan_json(env: &TestEnv, manifest: &std::path::Path) -> serde_json::Value {
  let output = env.converge_cmd().arg("--json").arg("plan").arg(manifest).output().unwrap();
  assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
  serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn apply_creates_then_plans_against_stored_state() {
  let mut server = Server::new();
  let create = server
    .mock("POST", "/roles")
    .match_header("authorization", "Bearer test-token")
    .with_status(201)
    .with_body(ROLE_BODY)
    .expect(1)
    .create();
  let get = server
    .mock("GET", "/roles/role1")
    .with_status(200)
    .with_header("etag", "W/\"e1\"")
    .with_body(ROLE_BODY)
    .expect_at_least(2)
    .create();

  let env = TestEnv::new(server.url());
  let manifest = env.manifest("role.json", &role_manifest("Reader"));

  env
    .converge_cmd()
    .arg("apply")
    .arg(&manifest)
    .assert()
    .success()
    .stdout(predicate::str::contains("Applied [create]"));
  assert!(env.state_dir().join("iam.Role").read_dir().unwrap().next().is_some());

  // The stored state carries the server-generated id, so the role is found.
  let plan = plan_json(&env, &manifest);
  assert_eq!(plan["exists"], true);
  assert_eq!(plan["plan"]["operations"], serde_json::json!([]));

  let changed = env.manifest("role.json", &role_manifest("Viewer"));
  let plan = plan_json(&env, &changed);
  assert_eq!(
    plan["plan"]["operations"],
    serde_json::json!([{ "op": "update", "name": "replaceRole" }])
  );
  assert_eq!(plan["diffs"][0]["path"], "display_name");

  create.assert();
  get.assert();
}

#[test]
fn plan_without_hint_assumes_absent() {
  let server = Server::new();
  let env = TestEnv::new(server.url());
  let manifest = env.manifest("role.json", &role_manifest("Reader"));

  let plan = plan_json(&env, &manifest);

  assert_eq!(plan["exists"], false);
  assert_eq!(plan["plan"]["operations"], serde_json::json!([{ "op": "create" }]));
}

#[test]
fn apply_reports_server_errors() {
  let mut server = Server::new();
  let create = server
    .mock("POST", "/roles")
    .with_status(400)
    .with_body(r#"{"trace":"t1","errors":[{"code":"invalid_body","message":"name is taken"}],"status_code":400}"#)
    .create();

  let env = TestEnv::new(server.url());
  let manifest = env.manifest("role.json", &role_manifest("Reader"));

  env
    .converge_cmd()
    .arg("apply")
    .arg(&manifest)
    .assert()
    .failure()
    .stderr(predicate::str::contains("name is taken"));
  create.assert();
}

#[test]
fn delete_removes_resource_and_state() {
  let mut server = Server::new();
  server
    .mock("POST", "/roles")
    .with_status(201)
    .with_body(ROLE_BODY)
    .create();
  server
    .mock("GET", "/roles/role1")
    .with_status(200)
    .with_body(ROLE_BODY)
    .create();
  let delete = server.mock("DELETE", "/roles/role1").with_status(204).expect(1).create();

  let env = TestEnv::new(server.url());
  let manifest = env.manifest("role.json", &role_manifest("Reader"));
  env.converge_cmd().arg("apply").arg(&manifest).assert().success();

  env
    .converge_cmd()
    .args(["delete", "--force"])
    .arg(&manifest)
    .assert()
    .success()
    .stdout(predicate::str::contains("Deleted iam.Role id=role1"));

  delete.assert();
  assert!(env.state_dir().join("iam.Role").read_dir().unwrap().next().is_none());
}

#[test]
fn list_prints_each_resource() {
  let mut server = Server::new();
  let list = server
    .mock("GET", Matcher::Regex("^/roles".into()))
    .match_query(Matcher::UrlEncoded("account_id".into(), "acct".into()))
    .with_status(200)
    .with_body(r#"{"custom_roles":[{"id":"role1","name":"Reader"},{"id":"role2","name":"Writer"}]}"#)
    .create();

  let env = TestEnv::new(server.url());
  let manifest = env.manifest("role.json", &role_manifest("Reader"));

  env
    .converge_cmd()
    .arg("list")
    .arg(&manifest)
    .assert()
    .success()
    .stdout(predicate::str::contains("id=role1"))
    .stdout(predicate::str::contains("id=role2"));
  list.assert();
}
