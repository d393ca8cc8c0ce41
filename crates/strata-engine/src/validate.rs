use std::collections::BTreeMap;

use strata_domain::{Config, ConfigType, Coordinate, EnvironmentKind, Manifest, Project};

use crate::error::ValidationError;

/// Cross-check loaded projects against the manifest's environments: every
/// environment exists, its auth can carry the configs aimed at it, and
/// openpipeline kinds stay unique. All findings are returned together.
#[must_use]
pub fn validate(projects: &[Project], manifest: &Manifest) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    undefined_environment_pass(projects, manifest, &mut errors);
    auth_adequacy_pass(projects, manifest, &mut errors);
    openpipeline_uniqueness_pass(projects, &mut errors);

    errors
}

fn each_config<'a>(projects: &'a [Project]) -> impl Iterator<Item = &'a Config> {
    projects
        .iter()
        .flat_map(|project| project.configs.values())
        .flat_map(|per_type| per_type.values())
        .flatten()
}

fn undefined_environment_pass(
    projects: &[Project],
    manifest: &Manifest,
    errors: &mut Vec<ValidationError>,
) {
    for config in each_config(projects) {
        if !manifest.environments.contains_key(&config.environment) {
            errors.push(ValidationError::UndefinedEnvironment {
                coordinate: config.coordinate.clone(),
                environment: config.environment.clone(),
            });
        }
    }
}

fn auth_adequacy_pass(
    projects: &[Project],
    manifest: &Manifest,
    errors: &mut Vec<ValidationError>,
) {
    for config in each_config(projects) {
        let Some(environment) = manifest.environments.get(&config.environment) else {
            continue;
        };

        if config.type_.requires_platform() {
            if environment.kind == EnvironmentKind::Classic {
                errors.push(ValidationError::PlatformRequired {
                    coordinate: config.coordinate.clone(),
                    environment: environment.name.clone(),
                });
            }
            if environment.auth.oauth.is_none() {
                errors.push(ValidationError::AuthInsufficient {
                    coordinate: config.coordinate.clone(),
                    environment: environment.name.clone(),
                    needed: "OAuth",
                });
            }
            continue;
        }

        match &config.type_ {
            ConfigType::ClassicApi { .. } => {
                if environment.auth.token.is_none() {
                    errors.push(ValidationError::AuthInsufficient {
                        coordinate: config.coordinate.clone(),
                        environment: environment.name.clone(),
                        needed: "token",
                    });
                }
            }
            ConfigType::SettingsSchema { .. } => {
                if environment.auth.token.is_none() && environment.auth.oauth.is_none() {
                    errors.push(ValidationError::AuthInsufficient {
                        coordinate: config.coordinate.clone(),
                        environment: environment.name.clone(),
                        needed: "token or OAuth",
                    });
                }
            }
            _ => {}
        }
    }
}

/// Only non-skipped configs count: a skipped duplicate will not deploy, so
/// it cannot collide.
fn openpipeline_uniqueness_pass(projects: &[Project], errors: &mut Vec<ValidationError>) {
    let mut by_environment_and_kind: BTreeMap<(String, String), Vec<Coordinate>> = BTreeMap::new();

    for config in each_config(projects) {
        if config.skip {
            continue;
        }
        if let ConfigType::OpenPipeline { pipeline_kind: kind } = &config.type_ {
            by_environment_and_kind
                .entry((config.environment.clone(), kind.clone()))
                .or_default()
                .push(config.coordinate.clone());
        }
    }

    for ((environment, kind), coordinates) in by_environment_and_kind {
        if coordinates.len() > 1 {
            errors.push(ValidationError::DuplicateOpenPipelineKind {
                environment,
                kind,
                coordinates,
            });
        }
    }
}
