use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strata_domain::{
    Auth, EnvironmentDefinition, EnvironmentKind, Manifest, OAuthCredentials, ProjectDefinition,
    Secret,
};
use tracing::debug;

use crate::error::ManifestError;

const SUPPORTED_VERSIONS: &[&str] = &["1.0", "1.1"];
const SUPPORTED_VERSIONS_TEXT: &str = "1.0, 1.1";

const SIMPLE_PROJECT_TYPE: &str = "simple";
const GROUPING_PROJECT_TYPE: &str = "grouping";

// ---------------------------------------------------------------------------
// Persistence DTOs (the on-disk YAML shape)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestDto {
    #[serde(rename = "manifestVersion")]
    manifest_version: String,
    #[serde(default)]
    projects: Vec<ProjectDto>,
    #[serde(rename = "environmentGroups", default)]
    environment_groups: Vec<GroupDto>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProjectDto {
    name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GroupDto {
    name: String,
    environments: Vec<EnvironmentDto>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EnvironmentDto {
    name: String,
    #[serde(rename = "type")]
    kind: EnvironmentKind,
    url: UrlDto,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth: Option<AuthDto>,
}

#[derive(Debug, Serialize, Deserialize)]
struct UrlDto {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    value: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AuthDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<SecretDto>,
    #[serde(rename = "oAuth", default, skip_serializing_if = "Option::is_none")]
    oauth: Option<OAuthDto>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SecretDto {
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OAuthDto {
    #[serde(rename = "clientId")]
    client_id: SecretDto,
    #[serde(rename = "clientSecret")]
    client_secret: SecretDto,
    #[serde(rename = "tokenEndpoint", default, skip_serializing_if = "Option::is_none")]
    token_endpoint: Option<UrlDto>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Which slice of the manifest a command wants.
#[derive(Debug, Clone, Default)]
pub struct ManifestFilter {
    /// Environment group names; empty means no filter.
    pub groups: Vec<String>,
    /// Environment names; empty means no filter.
    pub environments: Vec<String>,
    /// Error when the manifest declares no environment groups at all.
    pub require_environment_groups: bool,
}

/// Load and validate a manifest file. Secrets resolve from the process
/// environment here; nothing downstream sees variable names.
///
/// Field errors are collected per environment instead of failing fast, so a
/// broken manifest reports everything wrong with it at once.
pub fn load_manifest(path: &Path, filter: &ManifestFilter) -> Result<Manifest, Vec<ManifestError>> {
    let content = fs::read_to_string(path).map_err(|source| {
        vec![ManifestError::Read {
            path: path.to_path_buf(),
            source,
        }]
    })?;

    let dto: ManifestDto = serde_yaml::from_str(&content).map_err(|source| {
        vec![ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        }]
    })?;

    let mut errors = Vec::new();

    if !SUPPORTED_VERSIONS.contains(&dto.manifest_version.as_str()) {
        return Err(vec![ManifestError::UnsupportedVersion {
            version: dto.manifest_version,
            supported: SUPPORTED_VERSIONS_TEXT,
        }]);
    }

    if dto.environment_groups.is_empty() && filter.require_environment_groups {
        return Err(vec![ManifestError::EnvironmentGroupsRequired]);
    }

    for group in &filter.groups {
        if !dto.environment_groups.iter().any(|g| g.name == *group) {
            errors.push(ManifestError::UnknownGroup {
                group: group.clone(),
            });
        }
    }

    let declared_names: Vec<&str> = dto
        .environment_groups
        .iter()
        .flat_map(|group| group.environments.iter().map(|e| e.name.as_str()))
        .collect();
    for environment in &filter.environments {
        if !declared_names.contains(&environment.as_str()) {
            errors.push(ManifestError::UnknownEnvironment {
                environment: environment.clone(),
            });
        }
    }

    let mut environments = BTreeMap::new();
    for group in &dto.environment_groups {
        if !filter.groups.is_empty() && !filter.groups.contains(&group.name) {
            continue;
        }
        for environment in &group.environments {
            if !filter.environments.is_empty() && !filter.environments.contains(&environment.name) {
                continue;
            }
            if environments.contains_key(&environment.name) {
                errors.push(ManifestError::DuplicateEnvironment {
                    environment: environment.name.clone(),
                });
                continue;
            }
            match parse_environment(environment, &group.name, &mut errors) {
                Some(definition) => {
                    environments.insert(environment.name.clone(), definition);
                }
                None => continue,
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    if environments.is_empty() {
        return Err(vec![ManifestError::NoEnvironmentSelected]);
    }

    let manifest_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let projects = parse_projects(&dto, manifest_dir, &mut errors);
    if !errors.is_empty() {
        return Err(errors);
    }

    debug!(
        "loaded manifest {} with {} environment(s)",
        path.display(),
        environments.len()
    );

    Ok(Manifest {
        projects,
        environments,
    })
}

/// Simple project entries map one to one; grouping entries expand into one
/// project per subdirectory of their path, named `<group>.<dir>`.
fn parse_projects(
    dto: &ManifestDto,
    manifest_dir: &Path,
    errors: &mut Vec<ManifestError>,
) -> Vec<ProjectDefinition> {
    let mut projects = Vec::new();

    for project in &dto.projects {
        let path = project.path.clone().unwrap_or_else(|| project.name.clone());

        match project.kind.as_deref() {
            None | Some(SIMPLE_PROJECT_TYPE) => projects.push(ProjectDefinition {
                name: project.name.clone(),
                path: PathBuf::from(path),
            }),
            Some(GROUPING_PROJECT_TYPE) => {
                let group_dir = manifest_dir.join(&path);
                let entries = match fs::read_dir(&group_dir) {
                    Ok(entries) => entries,
                    Err(source) => {
                        errors.push(ManifestError::Read {
                            path: group_dir,
                            source,
                        });
                        continue;
                    }
                };
                let mut names: Vec<String> = entries
                    .filter_map(Result::ok)
                    .filter(|entry| entry.path().is_dir())
                    .filter_map(|entry| entry.file_name().into_string().ok())
                    .filter(|name| !name.starts_with('.'))
                    .collect();
                names.sort();
                for name in names {
                    projects.push(ProjectDefinition {
                        name: format!("{}.{name}", project.name),
                        path: PathBuf::from(format!("{path}/{name}")),
                    });
                }
            }
            Some(other) => errors.push(ManifestError::InvalidField {
                environment: project.name.clone(),
                field: "projects.type",
                reason: format!("unknown project type {other:?}"),
            }),
        }
    }

    projects
}

fn parse_environment(
    dto: &EnvironmentDto,
    group: &str,
    errors: &mut Vec<ManifestError>,
) -> Option<EnvironmentDefinition> {
    let before = errors.len();

    let url = resolve_url(&dto.url, &dto.name, "url", errors);

    let auth = dto.auth.as_ref().map_or_else(Auth::default, |auth| Auth {
        token: auth
            .token
            .as_ref()
            .and_then(|token| resolve_secret(token, &dto.name, "auth.token", errors)),
        oauth: auth.oauth.as_ref().and_then(|oauth| {
            let client_id = resolve_secret(&oauth.client_id, &dto.name, "auth.oAuth.clientId", errors);
            let client_secret = resolve_secret(
                &oauth.client_secret,
                &dto.name,
                "auth.oAuth.clientSecret",
                errors,
            );
            let token_endpoint = oauth
                .token_endpoint
                .as_ref()
                .and_then(|url| resolve_url(url, &dto.name, "auth.oAuth.tokenEndpoint", errors));
            Some(OAuthCredentials {
                client_id: client_id?,
                client_secret: client_secret?,
                token_endpoint,
            })
        }),
    });

    if auth.token.is_none() && auth.oauth.is_none() && errors.len() == before {
        errors.push(ManifestError::InvalidField {
            environment: dto.name.clone(),
            field: "auth",
            reason: "an environment needs a token, oAuth credentials, or both".to_string(),
        });
    }

    if errors.len() > before {
        return None;
    }

    Some(EnvironmentDefinition {
        name: dto.name.clone(),
        url: url?,
        kind: dto.kind,
        group: group.to_string(),
        auth,
    })
}

fn resolve_url(
    dto: &UrlDto,
    environment: &str,
    field: &'static str,
    errors: &mut Vec<ManifestError>,
) -> Option<String> {
    match dto.kind.as_deref() {
        None | Some("value") => {
            if dto.value.is_empty() {
                errors.push(ManifestError::InvalidField {
                    environment: environment.to_string(),
                    field,
                    reason: "value must not be empty".to_string(),
                });
                return None;
            }
            Some(dto.value.trim_end_matches('/').to_string())
        }
        Some("environment") => match env::var(&dto.value) {
            Ok(url) if !url.is_empty() => Some(url.trim_end_matches('/').to_string()),
            _ => {
                errors.push(ManifestError::MissingSecret {
                    environment: environment.to_string(),
                    field,
                    variable: dto.value.clone(),
                });
                None
            }
        },
        Some(other) => {
            errors.push(ManifestError::InvalidField {
                environment: environment.to_string(),
                field,
                reason: format!("unknown url type {other:?} (expected value or environment)"),
            });
            None
        }
    }
}

fn resolve_secret(
    dto: &SecretDto,
    environment: &str,
    field: &'static str,
    errors: &mut Vec<ManifestError>,
) -> Option<Secret> {
    match env::var(&dto.name) {
        Ok(value) if !value.is_empty() => Some(Secret::new(dto.name.clone(), value)),
        _ => {
            errors.push(ManifestError::MissingSecret {
                environment: environment.to_string(),
                field,
                variable: dto.name.clone(),
            });
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Serialize a manifest back to disk, the inverse of [`load_manifest`].
/// Secret values never leave memory; only variable names are written.
pub fn write_manifest(path: &Path, manifest: &Manifest) -> Result<(), ManifestError> {
    let dto = to_persistence(manifest);
    let yaml = serde_yaml::to_string(&dto).map_err(|source| ManifestError::Serialize { source })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| ManifestError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }

    fs::write(path, yaml).map_err(|source| ManifestError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn to_persistence(manifest: &Manifest) -> ManifestDto {
    let mut projects = Vec::new();
    let mut groupings: BTreeMap<String, ProjectDto> = BTreeMap::new();

    for project in &manifest.projects {
        let path = project.path.to_string_lossy().replace('\\', "/");

        if let Some((group_name, group_path)) = grouping_of(&project.name, &path) {
            groupings.insert(
                group_name.clone(),
                ProjectDto {
                    name: group_name,
                    kind: Some(GROUPING_PROJECT_TYPE.to_string()),
                    path: Some(group_path),
                },
            );
            continue;
        }

        projects.push(ProjectDto {
            name: project.name.clone(),
            kind: None,
            path: (project.name != path).then_some(path),
        });
    }
    projects.extend(groupings.into_values());

    let mut groups: BTreeMap<String, Vec<EnvironmentDto>> = BTreeMap::new();
    for environment in manifest.environments.values() {
        groups
            .entry(environment.group.clone())
            .or_default()
            .push(environment_dto(environment));
    }

    ManifestDto {
        manifest_version: SUPPORTED_VERSIONS[SUPPORTED_VERSIONS.len() - 1].to_string(),
        projects,
        environment_groups: groups
            .into_iter()
            .map(|(name, environments)| GroupDto { name, environments })
            .collect(),
    }
}

/// A project whose dotted name's slash form equals its path belongs to a
/// grouping entry: `name: a.b, path: a/b` came from `{name: a, type:
/// grouping, path: a}` plus directory `b`.
fn grouping_of(name: &str, path: &str) -> Option<(String, String)> {
    if !name.contains('.') || name.replace('.', "/") != path {
        return None;
    }

    let leaf = name.rsplit('.').next()?;
    let group_name = name.strip_suffix(&format!(".{leaf}"))?.to_string();
    let group_path = path.strip_suffix(&format!("/{leaf}"))?.to_string();
    Some((group_name, group_path))
}

fn environment_dto(environment: &EnvironmentDefinition) -> EnvironmentDto {
    let auth = AuthDto {
        token: environment.auth.token.as_ref().map(|token| SecretDto {
            name: token.name.clone(),
        }),
        oauth: environment.auth.oauth.as_ref().map(|oauth| OAuthDto {
            client_id: SecretDto {
                name: oauth.client_id.name.clone(),
            },
            client_secret: SecretDto {
                name: oauth.client_secret.name.clone(),
            },
            token_endpoint: oauth.token_endpoint.as_ref().map(|endpoint| UrlDto {
                kind: None,
                value: endpoint.clone(),
            }),
        }),
    };

    EnvironmentDto {
        name: environment.name.clone(),
        kind: environment.kind,
        url: UrlDto {
            kind: None,
            value: environment.url.clone(),
        },
        auth: Some(auth),
    }
}

#[cfg(test)]
mod tests;
