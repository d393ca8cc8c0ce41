use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use strata_client::ClientSet;
use strata_domain::{DeletePointer, is_classic_api};
use tracing::{info, warn};

use crate::error::DeleteError;

const DELETE_DELIMITER: char = '/';

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeleteFileDto {
    delete: Vec<serde_yaml::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeleteEntryDto {
    #[serde(default)]
    project: Option<String>,
    #[serde(rename = "type")]
    config_type: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Parse a delete file. Entries come in a short `"type/identifier"` form and
/// a full mapping form; each broken entry is reported with its index and the
/// rest is still parsed.
pub fn load_delete_file(path: &Path) -> Result<Vec<DeletePointer>, Vec<DeleteError>> {
    let content = fs::read_to_string(path).map_err(|source| {
        vec![DeleteError::Read {
            path: path.to_path_buf(),
            source,
        }]
    })?;

    if content.trim().is_empty() {
        return Err(vec![DeleteError::Empty {
            path: path.to_path_buf(),
        }]);
    }

    let dto: DeleteFileDto = serde_yaml::from_str(&content).map_err(|source| {
        vec![DeleteError::Parse {
            path: path.to_path_buf(),
            source,
        }]
    })?;

    let mut pointers = Vec::new();
    let mut errors = Vec::new();

    for (index, entry) in dto.delete.iter().enumerate() {
        match parse_entry(entry) {
            Ok(pointer) => pointers.push(pointer),
            Err(reason) => errors.push(DeleteError::InvalidEntry {
                value: render_entry(entry),
                index,
                reason,
            }),
        }
    }

    if errors.is_empty() { Ok(pointers) } else { Err(errors) }
}

fn render_entry(entry: &serde_yaml::Value) -> String {
    serde_yaml::to_string(entry)
        .unwrap_or_else(|_| "<unprintable>".to_string())
        .trim()
        .to_string()
}

fn parse_entry(entry: &serde_yaml::Value) -> Result<DeletePointer, String> {
    if let serde_yaml::Value::String(short) = entry {
        let pointer = parse_short_entry(short)?;
        check_known_type(&pointer.config_type)?;
        return Ok(pointer);
    }

    let parsed: DeleteEntryDto = serde_yaml::from_value(entry.clone())
        .map_err(|error| format!("not a valid delete entry: {error}"))?;
    check_known_type(&parsed.config_type)?;

    if is_classic_api(&parsed.config_type) {
        parse_api_entry(&parsed)
    } else {
        parse_coordinate_entry(&parsed)
    }
}

fn check_known_type(config_type: &str) -> Result<(), String> {
    if strata_client::supported_delete_types().contains(&config_type) {
        Ok(())
    } else {
        Err(format!("unknown config type {config_type:?}"))
    }
}

/// Short form: `type/identifier`, split at the first delimiter.
fn parse_short_entry(entry: &str) -> Result<DeletePointer, String> {
    let Some((config_type, identifier)) = entry.split_once(DELETE_DELIMITER) else {
        return Err(format!("invalid format. doesn't contain `{DELETE_DELIMITER}`"));
    };

    Ok(DeletePointer {
        project: None,
        config_type: config_type.to_string(),
        identifier: identifier.to_string(),
    })
}

/// Classic API objects are addressed by name; a stray id is ignored with a
/// warning.
fn parse_api_entry(parsed: &DeleteEntryDto) -> Result<DeletePointer, String> {
    let Some(name) = &parsed.name else {
        return Err("delete entry of API type requires config 'name' to be defined".to_string());
    };
    if parsed.id.is_some() {
        warn!(
            "delete entry for {} defines config 'id' - only 'name' will be used",
            parsed.config_type
        );
    }
    Ok(DeletePointer {
        project: None,
        config_type: parsed.config_type.clone(),
        identifier: name.clone(),
    })
}

/// Everything else is addressed by coordinate: project and id are mandatory.
fn parse_coordinate_entry(parsed: &DeleteEntryDto) -> Result<DeletePointer, String> {
    let Some(id) = &parsed.id else {
        return Err("delete entry requires config 'id' to be defined".to_string());
    };
    let Some(project) = &parsed.project else {
        return Err("delete entry requires 'project' to be defined".to_string());
    };
    if parsed.name.is_some() {
        warn!(
            "delete entry for {} defines config 'name' - only 'id' will be used",
            parsed.config_type
        );
    }
    Ok(DeletePointer {
        project: Some(project.clone()),
        config_type: parsed.config_type.clone(),
        identifier: id.clone(),
    })
}

/// Delete every pointed-at object from every selected environment. Objects
/// that are already gone are fine; transport failures are counted per
/// environment and reported together.
pub async fn delete_configs(
    client_sets: &BTreeMap<String, ClientSet>,
    pointers: &[DeletePointer],
) -> Result<(), Vec<DeleteError>> {
    let mut errors = Vec::new();

    for (environment, clients) in client_sets {
        let mut failed = 0usize;
        for pointer in pointers {
            match clients.delete(pointer).await {
                Ok(()) => info!(
                    "deleted {}/{} from {environment}",
                    pointer.config_type, pointer.identifier
                ),
                Err(error) => {
                    warn!(
                        "failed to delete {}/{} from {environment}: {error}",
                        pointer.config_type, pointer.identifier
                    );
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            errors.push(DeleteError::Failed {
                environment: environment.clone(),
                count: failed,
            });
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use std::fs;
    use std::path::PathBuf;

    use super::load_delete_file;
    use crate::error::DeleteError;

    fn write_delete_file(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("delete.yaml");
        fs::write(&path, content).expect("write delete file");
        (dir, path)
    }

    #[test]
    fn parses_short_and_full_forms() {
        let (_dir, path) = write_delete_file(
            r"delete:
- dashboard/My Dashboard
- type: management-zone
  name: Legacy Zone
- type: bucket
  project: infra
  id: raw-logs
",
        );

        let pointers = load_delete_file(&path).expect("parse");
        assert_eq!(pointers.len(), 3);
        assert_eq!(pointers[0].config_type, "dashboard");
        assert_eq!(pointers[0].identifier, "My Dashboard");
        assert_eq!(pointers[1].identifier, "Legacy Zone");
        assert_eq!(pointers[2].project.as_deref(), Some("infra"));
        assert_eq!(pointers[2].identifier, "raw-logs");
    }

    #[test]
    fn api_entries_without_a_name_error_with_their_index() {
        let (_dir, path) = write_delete_file(
            r"delete:
- dashboard/fine
- type: dashboard
  id: not-enough
",
        );

        let errors = load_delete_file(&path).expect_err("must fail");
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            DeleteError::InvalidEntry { index: 1, reason, .. } if reason.contains("'name'")
        ));
    }

    #[test]
    fn coordinate_entries_need_project_and_id() {
        let (_dir, path) = write_delete_file(
            r"delete:
- type: bucket
  name: only-a-name
",
        );

        let errors = load_delete_file(&path).expect_err("must fail");
        assert!(matches!(
            &errors[0],
            DeleteError::InvalidEntry { reason, .. } if reason.contains("'id'")
        ));
    }

    #[test]
    fn short_entries_without_delimiter_error() {
        let (_dir, path) = write_delete_file("delete:\n- just-a-string\n");
        let errors = load_delete_file(&path).expect_err("must fail");
        assert!(matches!(&errors[0], DeleteError::InvalidEntry { index: 0, .. }));
    }

    #[test]
    fn empty_files_are_rejected() {
        let (_dir, path) = write_delete_file("");
        let errors = load_delete_file(&path).expect_err("must fail");
        assert!(matches!(&errors[0], DeleteError::Empty { .. }));
    }

    #[test]
    fn unknown_types_are_rejected() {
        let (_dir, path) = write_delete_file("delete:\n- mystery-type/thing\n");
        let errors = load_delete_file(&path).expect_err("must fail");
        assert!(matches!(
            &errors[0],
            DeleteError::InvalidEntry { reason, .. } if reason.contains("unknown config type")
        ));
    }

    #[test]
    fn short_form_splits_at_the_first_delimiter_only() {
        let (_dir, path) = write_delete_file("delete:\n- dashboard/team/overview\n");
        let pointers = load_delete_file(&path).expect("parse");
        assert_eq!(pointers[0].config_type, "dashboard");
        assert_eq!(pointers[0].identifier, "team/overview");
    }
}
