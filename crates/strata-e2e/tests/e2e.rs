#![allow(clippy::expect_used)]

use std::fs;
use std::path::Path;

use strata_e2e::{RunResult, run_strata, write_file};
use tempfile::TempDir;

fn secrets() -> Vec<(String, String)> {
    vec![
        ("E2E_TOKEN".to_string(), "e2e-token-value".to_string()),
        ("E2E_CLIENT_ID".to_string(), "e2e-client-id".to_string()),
        ("E2E_CLIENT_SECRET".to_string(), "e2e-client-secret".to_string()),
    ]
}

fn classic_manifest(root: &Path) {
    write_file(
        &root.join("manifest.yaml"),
        r#"manifestVersion: "1.0"
projects:
- name: infra
environmentGroups:
- name: default
  environments:
  - name: dev
    type: classic
    url:
      value: https://dev.invalid.example.com
    auth:
      token:
        name: E2E_TOKEN
"#,
    )
    .expect("write manifest");
}

fn platform_manifest(root: &Path) {
    write_file(
        &root.join("manifest.yaml"),
        r#"manifestVersion: "1.0"
projects:
- name: infra
environmentGroups:
- name: default
  environments:
  - name: dev
    type: platform
    url:
      value: https://dev.invalid.example.com
    auth:
      oAuth:
        clientId:
          name: E2E_CLIENT_ID
        clientSecret:
          name: E2E_CLIENT_SECRET
"#,
    )
    .expect("write manifest");
}

fn dashboard_config(root: &Path) {
    write_file(
        &root.join("infra/dashboard/dashboards.yaml"),
        r#"configs:
- id: overview
  config:
    name: Overview
    template: overview.json
"#,
    )
    .expect("write config");
    write_file(
        &root.join("infra/dashboard/overview.json"),
        r#"{"name":"{{ .name }}"}"#,
    )
    .expect("write template");
}

fn deploy(root: &Path, extra: &[&str]) -> RunResult {
    let mut args = vec!["deploy", "--manifest", "manifest.yaml"];
    args.extend_from_slice(extra);
    run_strata(root, &args, &secrets()).expect("run strata")
}

#[test]
fn dry_run_deploy_succeeds_and_writes_a_report() {
    let dir = TempDir::new().expect("tempdir");
    classic_manifest(dir.path());
    dashboard_config(dir.path());

    let result = deploy(dir.path(), &["--dry-run", "--report", "report.jsonl"]);
    assert_eq!(result.exit_code, 0, "{}", result.transcript());
    assert!(
        result.stdout.contains("The deployment finished without errors."),
        "{}",
        result.transcript()
    );

    let report = fs::read_to_string(dir.path().join("report.jsonl")).expect("report file");
    let record: serde_json::Value =
        serde_json::from_str(report.lines().next().expect("one record")).expect("json record");
    assert_eq!(record["type"], "DEPLOY");
    assert_eq!(record["state"], "SUCCESS");
    assert_eq!(record["config"]["project"], "infra");
}

#[test]
fn missing_manifest_is_an_io_error() {
    let dir = TempDir::new().expect("tempdir");
    let result = deploy(dir.path(), &[]);
    assert_eq!(result.exit_code, 3, "{}", result.transcript());
}

#[test]
fn unresolvable_secrets_fail_validation_before_any_deploy() {
    let dir = TempDir::new().expect("tempdir");
    classic_manifest(dir.path());
    dashboard_config(dir.path());

    let result = run_strata(
        dir.path(),
        &["deploy", "--manifest", "manifest.yaml", "--dry-run"],
        &[],
    )
    .expect("run strata");
    assert_eq!(result.exit_code, 1, "{}", result.transcript());
    assert!(
        result.stderr.contains("E2E_TOKEN"),
        "the missing variable is named: {}",
        result.transcript()
    );
}

#[test]
fn duplicate_openpipeline_kinds_fail_validation() {
    let dir = TempDir::new().expect("tempdir");
    platform_manifest(dir.path());
    write_file(
        &dir.path().join("infra/pipelines.yaml"),
        r#"configs:
- id: logs-one
  type:
    openpipeline:
      kind: logs
  config:
    name: One
    template: pipeline.json
- id: logs-two
  type:
    openpipeline:
      kind: logs
  config:
    name: Two
    template: pipeline.json
"#,
    )
    .expect("write config");
    write_file(&dir.path().join("infra/pipeline.json"), "{}").expect("write template");

    let result = deploy(dir.path(), &["--dry-run"]);
    assert_eq!(result.exit_code, 1, "{}", result.transcript());
    assert!(
        result.stderr.contains("openpipeline"),
        "{}",
        result.transcript()
    );
    assert!(
        result.stderr.contains("logs"),
        "the duplicated kind is named: {}",
        result.transcript()
    );
}

#[test]
fn circular_parameters_fail_before_deploy() {
    let dir = TempDir::new().expect("tempdir");
    classic_manifest(dir.path());
    write_file(
        &dir.path().join("infra/dashboard/dashboards.yaml"),
        r#"configs:
- id: tangled
  config:
    name:
      type: reference
      configType: dashboard
      configId: tangled
      property: owner
    template: board.json
    parameters:
      owner:
        type: reference
        configType: dashboard
        configId: tangled
        property: name
"#,
    )
    .expect("write config");
    write_file(&dir.path().join("infra/dashboard/board.json"), "{}").expect("write template");

    let result = deploy(dir.path(), &["--dry-run"]);
    assert_eq!(result.exit_code, 1, "{}", result.transcript());
    assert!(
        result.stderr.contains("circular dependency"),
        "{}",
        result.transcript()
    );
    assert!(result.stderr.contains("\"name\""), "{}", result.transcript());
    assert!(result.stderr.contains("\"owner\""), "{}", result.transcript());
}

#[test]
fn invalid_delete_entries_fail_with_their_index() {
    let dir = TempDir::new().expect("tempdir");
    classic_manifest(dir.path());
    write_file(
        &dir.path().join("delete.yaml"),
        r#"delete:
- type: dashboard
  id: missing-the-name
"#,
    )
    .expect("write delete file");

    let result = run_strata(
        dir.path(),
        &["delete", "--manifest", "manifest.yaml"],
        &secrets(),
    )
    .expect("run strata");
    assert_eq!(result.exit_code, 1, "{}", result.transcript());
    assert!(
        result.stderr.contains("index `0`"),
        "{}",
        result.transcript()
    );
}

#[test]
fn help_prints_and_exits_cleanly() {
    let dir = TempDir::new().expect("tempdir");
    let result = run_strata(dir.path(), &["--help"], &[]).expect("run strata");
    assert_eq!(result.exit_code, 0, "{}", result.transcript());
    assert!(result.stdout.contains("deploy"));
    assert!(result.stdout.contains("delete"));
}

#[test]
fn mixed_layouts_are_rejected() {
    let dir = TempDir::new().expect("tempdir");
    classic_manifest(dir.path());
    dashboard_config(dir.path());
    fs::create_dir_all(dir.path().join("infra/not-an-api")).expect("mkdir");

    let result = deploy(dir.path(), &["--dry-run"]);
    assert_eq!(result.exit_code, 1, "{}", result.transcript());
    assert!(
        result.stderr.contains("API directories"),
        "{}",
        result.transcript()
    );
}
