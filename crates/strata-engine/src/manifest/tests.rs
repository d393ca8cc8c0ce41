#![allow(clippy::expect_used)]

use std::fs;
use std::path::PathBuf;

use strata_domain::{EnvironmentKind, Manifest, ProjectDefinition};

use super::{ManifestFilter, load_manifest, write_manifest};
use crate::error::ManifestError;

// Tests reuse PATH as the secret variable: it is set in every environment
// this suite runs in, and spawning processes to control variables is the
// e2e suite's job.
fn manifest_yaml(environments: &str) -> String {
    format!(
        r#"manifestVersion: "1.0"
projects:
- name: infra
environmentGroups:
- name: default
  environments:
{environments}"#
    )
}

fn classic_env(name: &str) -> String {
    format!(
        r"  - name: {name}
    type: classic
    url:
      value: https://{name}.example.com
    auth:
      token:
        name: PATH
"
    )
}

fn write_manifest_file(content: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("manifest.yaml");
    fs::write(&path, content).expect("write manifest");
    (dir, path)
}

#[test]
fn loads_a_minimal_classic_manifest() {
    let (_dir, path) = write_manifest_file(&manifest_yaml(&classic_env("dev")));

    let manifest = load_manifest(&path, &ManifestFilter::default()).expect("load");
    assert_eq!(manifest.projects.len(), 1);
    assert_eq!(manifest.projects[0].name, "infra");

    let dev = manifest.environments.get("dev").expect("dev environment");
    assert_eq!(dev.kind, EnvironmentKind::Classic);
    assert_eq!(dev.group, "default");
    assert_eq!(dev.url, "https://dev.example.com");
    let token = dev.auth.token.as_ref().expect("token");
    assert_eq!(token.name, "PATH");
    assert!(!token.value().is_empty());
}

#[test]
fn unsupported_versions_are_rejected() {
    let (_dir, path) = write_manifest_file(
        "manifestVersion: \"99.0\"\nprojects: []\nenvironmentGroups: []\n",
    );

    let errors = load_manifest(&path, &ManifestFilter::default()).expect_err("must fail");
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        ManifestError::UnsupportedVersion { version, .. } if version == "99.0"
    ));
}

#[test]
fn missing_secrets_are_collected_per_field() {
    let environments = r"  - name: dev
    type: platform
    url:
      value: https://dev.example.com
    auth:
      oAuth:
        clientId:
          name: STRATA_TEST_MISSING_ID
        clientSecret:
          name: STRATA_TEST_MISSING_SECRET
";
    let (_dir, path) = write_manifest_file(&manifest_yaml(environments));

    let errors = load_manifest(&path, &ManifestFilter::default()).expect_err("must fail");
    let missing: Vec<&str> = errors
        .iter()
        .filter_map(|error| match error {
            ManifestError::MissingSecret { variable, .. } => Some(variable.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        missing,
        vec!["STRATA_TEST_MISSING_ID", "STRATA_TEST_MISSING_SECRET"],
        "both broken fields must be reported in one pass: {errors:?}"
    );
}

#[test]
fn group_filter_drops_other_groups() {
    let content = format!(
        r#"manifestVersion: "1.0"
projects:
- name: infra
environmentGroups:
- name: non-prod
  environments:
{}- name: prod
  environments:
{}"#,
        classic_env("dev"),
        classic_env("live")
    );
    let (_dir, path) = write_manifest_file(&content);

    let filter = ManifestFilter {
        groups: vec!["non-prod".to_string()],
        ..ManifestFilter::default()
    };
    let manifest = load_manifest(&path, &filter).expect("load");
    assert!(manifest.environments.contains_key("dev"));
    assert!(!manifest.environments.contains_key("live"));
}

#[test]
fn unknown_filter_names_error() {
    let (_dir, path) = write_manifest_file(&manifest_yaml(&classic_env("dev")));

    let filter = ManifestFilter {
        groups: vec!["nope".to_string()],
        environments: vec!["also-nope".to_string()],
        ..ManifestFilter::default()
    };
    let errors = load_manifest(&path, &filter).expect_err("must fail");
    assert!(errors
        .iter()
        .any(|error| matches!(error, ManifestError::UnknownGroup { group } if group == "nope")));
    assert!(errors.iter().any(
        |error| matches!(error, ManifestError::UnknownEnvironment { environment } if environment == "also-nope")
    ));
}

#[test]
fn empty_groups_error_when_required() {
    let (_dir, path) = write_manifest_file(
        "manifestVersion: \"1.0\"\nprojects:\n- name: infra\nenvironmentGroups: []\n",
    );

    let filter = ManifestFilter {
        require_environment_groups: true,
        ..ManifestFilter::default()
    };
    let errors = load_manifest(&path, &filter).expect_err("must fail");
    assert!(matches!(errors[0], ManifestError::EnvironmentGroupsRequired));
}

#[test]
fn roundtrip_preserves_environments_and_infers_groupings() {
    let (_dir, path) = write_manifest_file(&manifest_yaml(&classic_env("dev")));
    let mut manifest = load_manifest(&path, &ManifestFilter::default()).expect("load");

    // a dotted project whose slash form matches the path came from a grouping
    manifest.projects.push(ProjectDefinition {
        name: "teams.checkout".to_string(),
        path: PathBuf::from("teams/checkout"),
    });

    let out = path.with_file_name("written.yaml");
    write_manifest(&out, &manifest).expect("write");
    let written = fs::read_to_string(&out).expect("read back");

    assert!(written.contains("type: grouping"));
    assert!(written.contains("name: teams"));
    assert!(written.contains("name: PATH"), "secret names round-trip");
    assert!(
        !written.contains(&std::env::var("PATH").expect("PATH")),
        "secret values must never be written"
    );

    // the grouping entry expands against the directory tree on reload
    fs::create_dir_all(out.parent().expect("parent").join("teams/checkout"))
        .expect("create group dirs");
    let reloaded: Manifest =
        load_manifest(&out, &ManifestFilter::default()).expect("reload written manifest");
    assert!(reloaded.environments.contains_key("dev"));
    assert!(
        reloaded
            .projects
            .iter()
            .any(|project| project.name == "teams.checkout"
                && project.path == PathBuf::from("teams/checkout")),
        "grouping entries expand back into their member projects: {:?}",
        reloaded.projects
    );
}
