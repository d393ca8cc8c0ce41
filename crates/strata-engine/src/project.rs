use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use strata_domain::{
    AutomationResource, Config, ConfigType, Coordinate, DocumentKind, Manifest, Parameter,
    ParameterReference, Project, Template, is_classic_api,
};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::ProjectError;

// ---------------------------------------------------------------------------
// Config file DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFileDto {
    configs: Vec<ConfigEntryDto>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigEntryDto {
    id: String,
    config: ConfigBodyDto,
    #[serde(rename = "type", default)]
    type_: Option<TypeDto>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigBodyDto {
    #[serde(default)]
    name: Option<serde_yaml::Value>,
    template: PathBuf,
    #[serde(default)]
    skip: Option<SkipDto>,
    #[serde(default)]
    parameters: BTreeMap<String, serde_yaml::Value>,
    #[serde(rename = "originObjectId", default)]
    origin_object_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SkipDto {
    Literal(bool),
    Parameter(serde_yaml::Value),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TypeDto {
    Shorthand(String),
    Map(TypeMapDto),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TypeMapDto {
    #[serde(default)]
    api: Option<String>,
    #[serde(default)]
    settings: Option<SettingsTypeDto>,
    #[serde(default)]
    automation: Option<AutomationTypeDto>,
    #[serde(default)]
    document: Option<DocumentTypeDto>,
    #[serde(default)]
    openpipeline: Option<OpenPipelineTypeDto>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsTypeDto {
    schema: String,
    #[serde(default = "default_scope")]
    scope: String,
}

fn default_scope() -> String {
    "environment".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AutomationTypeDto {
    resource: AutomationResource,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DocumentTypeDto {
    kind: DocumentKind,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OpenPipelineTypeDto {
    kind: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load every project the manifest declares. Errors are accumulated over the
/// whole tree; the caller decides whether the partial result is usable.
///
/// `specific_projects` narrows the load; projects referenced by the selected
/// ones are pulled in as well so their coordinates stay resolvable.
pub fn load_projects(
    manifest_dir: &Path,
    manifest: &Manifest,
    specific_projects: &[String],
) -> (Vec<Project>, Vec<ProjectError>) {
    let mut projects = Vec::new();
    let mut errors = Vec::new();
    let mut seen_coordinates = BTreeSet::new();

    for definition in &manifest.projects {
        let root = manifest_dir.join(&definition.path);
        match load_project(&definition.name, &root, manifest, &mut seen_coordinates) {
            Ok((project, mut project_errors)) => {
                errors.append(&mut project_errors);
                projects.push(project);
            }
            Err(error) => errors.push(error),
        }
    }

    if !specific_projects.is_empty() {
        projects = filter_with_dependencies(projects, specific_projects);
    }

    (projects, errors)
}

/// Keep the requested projects plus everything they depend on, found by
/// chasing recorded cross-project dependencies until the set is stable.
fn filter_with_dependencies(projects: Vec<Project>, requested: &[String]) -> Vec<Project> {
    let mut wanted: BTreeSet<String> = requested.iter().cloned().collect();

    loop {
        let mut grew = false;
        for project in &projects {
            if !wanted.contains(&project.id) {
                continue;
            }
            for dependencies in project.dependencies.values() {
                for dependency in dependencies {
                    if wanted.insert(dependency.clone()) {
                        grew = true;
                    }
                }
            }
        }
        if !grew {
            break;
        }
    }

    projects
        .into_iter()
        .filter(|project| wanted.contains(&project.id))
        .collect()
}

fn load_project(
    id: &str,
    root: &Path,
    manifest: &Manifest,
    seen_coordinates: &mut BTreeSet<Coordinate>,
) -> Result<(Project, Vec<ProjectError>), ProjectError> {
    if !root.is_dir() {
        return Err(ProjectError::RootDoesNotExist {
            path: root.to_path_buf(),
        });
    }

    let mut project = Project::new(id);
    let mut errors = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) => {
                errors.push(ProjectError::Walk { source });
                continue;
            }
        };

        if entry.file_type().is_dir() {
            if let Some(error) = mixed_layout_of(entry.path()) {
                errors.push(error);
            }
            continue;
        }

        let path = entry.path();
        if path.file_name().is_some_and(|name| name.to_string_lossy().starts_with('.')) {
            continue;
        }
        let is_yaml = path
            .extension()
            .is_some_and(|extension| extension == "yaml" || extension == "yml");
        if !is_yaml {
            continue;
        }

        let api_dir = path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().to_string())
            .filter(|name| is_classic_api(name));

        load_config_file(
            &mut project,
            path,
            api_dir.as_deref(),
            manifest,
            seen_coordinates,
            &mut errors,
        );
    }

    debug!(
        "loaded project {} with configs for {} environment(s)",
        project.id,
        project.configs.len()
    );
    Ok((project, errors))
}

/// API directories hold classic configs only; mixing them with other
/// directories under one parent makes the layout ambiguous.
fn mixed_layout_of(dir: &Path) -> Option<ProjectError> {
    let entries = fs::read_dir(dir).ok()?;
    let mut has_api = false;
    let mut has_other = false;

    for entry in entries.filter_map(Result::ok) {
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        if is_classic_api(&name) {
            has_api = true;
        } else {
            has_other = true;
        }
    }

    (has_api && has_other).then(|| ProjectError::MixedLayout {
        parent: dir.to_path_buf(),
    })
}

fn load_config_file(
    project: &mut Project,
    path: &Path,
    api_dir: Option<&str>,
    manifest: &Manifest,
    seen_coordinates: &mut BTreeSet<Coordinate>,
    errors: &mut Vec<ProjectError>,
) {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(source) => {
            errors.push(ProjectError::ConfigRead {
                path: path.to_path_buf(),
                source,
            });
            return;
        }
    };

    let dto: ConfigFileDto = match serde_yaml::from_str(&content) {
        Ok(dto) => dto,
        Err(source) => {
            errors.push(ProjectError::ConfigParse {
                path: path.to_path_buf(),
                source,
            });
            return;
        }
    };

    for entry in dto.configs {
        load_config_entry(project, path, api_dir, manifest, seen_coordinates, errors, entry);
    }
}

fn load_config_entry(
    project: &mut Project,
    path: &Path,
    api_dir: Option<&str>,
    manifest: &Manifest,
    seen_coordinates: &mut BTreeSet<Coordinate>,
    errors: &mut Vec<ProjectError>,
    entry: ConfigEntryDto,
) {
    let Some(type_) = bind_type(&entry, api_dir, path, errors) else {
        return;
    };

    let coordinate = Coordinate::new(project.id.clone(), type_.name(), entry.id.clone());
    if !seen_coordinates.insert(coordinate.clone()) {
        errors.push(ProjectError::DuplicateCoordinate { coordinate });
        return;
    }

    let mut parameters = BTreeMap::new();
    let mut parse_failed = false;
    for (name, raw) in &entry.config.parameters {
        match parse_parameter(raw, &coordinate, project, name) {
            Ok(parameter) => {
                parameters.insert(name.clone(), parameter);
            }
            Err(error) => {
                errors.push(error);
                parse_failed = true;
            }
        }
    }

    if let Some(raw_name) = &entry.config.name {
        match parse_parameter(raw_name, &coordinate, project, Config::NAME_PARAMETER) {
            Ok(parameter) => {
                parameters.insert(Config::NAME_PARAMETER.to_string(), parameter);
            }
            Err(error) => {
                errors.push(error);
                parse_failed = true;
            }
        }
    }

    if type_.is_classic_api() && !parameters.contains_key(Config::NAME_PARAMETER) {
        errors.push(ProjectError::NameMissing {
            coordinate: coordinate.clone(),
        });
        return;
    }

    let skip = match resolve_skip(entry.config.skip.as_ref(), &coordinate) {
        Ok(skip) => skip,
        Err(error) => {
            errors.push(error);
            return;
        }
    };

    let template_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let template_path = crate::fs_util::normalize_path(&template_dir.join(&entry.config.template));
    let template_content = match fs::read_to_string(&template_path) {
        Ok(content) => content,
        Err(source) => {
            errors.push(ProjectError::TemplateUnreadable {
                coordinate: coordinate.clone(),
                path: template_path,
                source,
            });
            return;
        }
    };

    // every placeholder must be fillable, or the render is doomed anyway
    for key in crate::template::placeholder_keys(&template_content) {
        if !parameters.contains_key(&key) {
            errors.push(ProjectError::InvalidParameter {
                coordinate: coordinate.clone(),
                parameter: key,
                reason: "template references an undeclared parameter".to_string(),
            });
            parse_failed = true;
        }
    }

    if parse_failed {
        return;
    }

    // one config instance per declared environment
    for environment in manifest.environments.keys() {
        let config = Config {
            coordinate: coordinate.clone(),
            environment: environment.clone(),
            type_: type_.clone(),
            template: Template {
                path: template_path.clone(),
                content: template_content.clone(),
            },
            parameters: parameters.clone(),
            skip,
            original_object_id: entry.config.origin_object_id.clone(),
        };

        record_cross_project_dependencies(project, &config);

        project
            .configs
            .entry(environment.clone())
            .or_default()
            .entry(type_.name())
            .or_default()
            .push(config);
    }
}

fn record_cross_project_dependencies(project: &mut Project, config: &Config) {
    for reference in config.parameters.values().flat_map(Parameter::references) {
        if reference.config.project == project.id {
            continue;
        }
        let dependencies = project
            .dependencies
            .entry(config.environment.clone())
            .or_default();
        if !dependencies.contains(&reference.config.project) {
            dependencies.push(reference.config.project.clone());
        }
    }
}

fn bind_type(
    entry: &ConfigEntryDto,
    api_dir: Option<&str>,
    path: &Path,
    errors: &mut Vec<ProjectError>,
) -> Option<ConfigType> {
    let classic = |api: &str| {
        strata_domain::classic_api(api).map(|definition| ConfigType::ClassicApi {
            api: definition.id.to_string(),
            single_instance: definition.single_instance,
        })
    };

    match (&entry.type_, api_dir) {
        (None, Some(api)) => classic(api).or_else(|| {
            errors.push(ProjectError::UnknownType {
                path: path.to_path_buf(),
                type_name: api.to_string(),
            });
            None
        }),
        (Some(TypeDto::Shorthand(name)), _) => {
            let bound = match name.as_str() {
                "bucket" => Some(ConfigType::Bucket),
                "policy" => Some(ConfigType::Policy),
                "group" => Some(ConfigType::Group),
                "user" => Some(ConfigType::User),
                other => classic(other),
            };
            bound.or_else(|| {
                errors.push(ProjectError::UnknownType {
                    path: path.to_path_buf(),
                    type_name: name.clone(),
                });
                None
            })
        }
        (Some(TypeDto::Map(map)), _) => bind_mapped_type(map, classic).or_else(|| {
            errors.push(ProjectError::UnknownType {
                path: path.to_path_buf(),
                type_name: "<map>".to_string(),
            });
            None
        }),
        (None, None) => {
            errors.push(ProjectError::TypeMissing {
                path: path.to_path_buf(),
            });
            None
        }
    }
}

fn bind_mapped_type(
    map: &TypeMapDto,
    classic: impl Fn(&str) -> Option<ConfigType>,
) -> Option<ConfigType> {
    if let Some(api) = &map.api {
        return classic(api);
    }
    if let Some(settings) = &map.settings {
        return Some(ConfigType::SettingsSchema {
            schema_id: settings.schema.clone(),
            scope: settings.scope.clone(),
        });
    }
    if let Some(automation) = &map.automation {
        return Some(ConfigType::Automation {
            resource: automation.resource,
        });
    }
    if let Some(document) = &map.document {
        return Some(ConfigType::Document {
            document_kind: document.kind,
        });
    }
    if let Some(openpipeline) = &map.openpipeline {
        return Some(ConfigType::OpenPipeline {
            pipeline_kind: openpipeline.kind.clone(),
        });
    }
    None
}

// ---------------------------------------------------------------------------
// Parameter parsing
// ---------------------------------------------------------------------------

/// Parse one parameter declaration. Scalars and sequences are value
/// shorthands; mappings must carry a known `type` tag. Unknown kinds are
/// collected as errors without failing the whole file.
fn parse_parameter(
    raw: &serde_yaml::Value,
    coordinate: &Coordinate,
    project: &Project,
    name: &str,
) -> Result<Parameter, ProjectError> {
    let mapping = match raw {
        serde_yaml::Value::Mapping(mapping) => mapping,
        shorthand => {
            let value = yaml_to_json(shorthand).map_err(|reason| ProjectError::InvalidParameter {
                coordinate: coordinate.clone(),
                parameter: name.to_string(),
                reason,
            })?;
            return Ok(Parameter::Value { value });
        }
    };

    let kind = mapping
        .get("type")
        .and_then(serde_yaml::Value::as_str)
        .unwrap_or("value");

    let invalid = |reason: String| ProjectError::InvalidParameter {
        coordinate: coordinate.clone(),
        parameter: name.to_string(),
        reason,
    };

    let string_field = |field: &str| -> Option<String> {
        mapping
            .get(field)
            .and_then(serde_yaml::Value::as_str)
            .map(ToOwned::to_owned)
    };

    match kind {
        "value" => {
            let value = mapping
                .get("value")
                .ok_or_else(|| invalid("value parameters need a value field".to_string()))?;
            Ok(Parameter::Value {
                value: yaml_to_json(value).map_err(invalid)?,
            })
        }
        "environment" => {
            let variable = string_field("name")
                .ok_or_else(|| invalid("environment parameters need a name field".to_string()))?;
            Ok(Parameter::Environment {
                name: variable,
                default: string_field("default"),
            })
        }
        "reference" => Ok(Parameter::Reference {
            reference: parse_reference(mapping, project).map_err(invalid)?,
        }),
        "file" => {
            let path = string_field("path")
                .ok_or_else(|| invalid("file parameters need a path field".to_string()))?;
            let escape = mapping
                .get("escape")
                .and_then(serde_yaml::Value::as_bool)
                .unwrap_or(true);
            Ok(Parameter::File {
                path: PathBuf::from(path),
                escape,
                references: parse_reference_list(mapping, project).map_err(invalid)?,
            })
        }
        "compound" => {
            let format = string_field("format")
                .ok_or_else(|| invalid("compound parameters need a format field".to_string()))?;
            Ok(Parameter::Compound {
                format,
                references: parse_reference_list(mapping, project).map_err(invalid)?,
            })
        }
        "list" => {
            let values = mapping
                .get("values")
                .and_then(serde_yaml::Value::as_sequence)
                .ok_or_else(|| invalid("list parameters need a values sequence".to_string()))?;
            let mut parsed = Vec::with_capacity(values.len());
            for value in values {
                parsed.push(parse_parameter(value, coordinate, project, name)?);
            }
            Ok(Parameter::List { values: parsed })
        }
        unknown => Err(ProjectError::UnknownParameterKind {
            coordinate: coordinate.clone(),
            parameter: name.to_string(),
            kind: unknown.to_string(),
        }),
    }
}

/// References are written flat: `project` (optional, defaults to the current
/// one), `configType`, `configId`, `property`.
fn parse_reference(
    mapping: &serde_yaml::Mapping,
    project: &Project,
) -> Result<ParameterReference, String> {
    let field = |name: &str| {
        mapping
            .get(name)
            .and_then(serde_yaml::Value::as_str)
            .map(ToOwned::to_owned)
    };

    let target_project = field("project").unwrap_or_else(|| project.id.clone());
    let config_type = field("configType")
        .ok_or_else(|| "references need a configType field".to_string())?;
    let config_id = field("configId").ok_or_else(|| "references need a configId field".to_string())?;
    let property = field("property").ok_or_else(|| "references need a property field".to_string())?;

    Ok(ParameterReference::new(
        Coordinate::new(target_project, config_type, config_id),
        property,
    ))
}

fn parse_reference_list(
    mapping: &serde_yaml::Mapping,
    project: &Project,
) -> Result<Vec<ParameterReference>, String> {
    let Some(references) = mapping.get("references") else {
        return Ok(Vec::new());
    };
    let sequence = references
        .as_sequence()
        .ok_or_else(|| "references must be a sequence".to_string())?;

    let mut parsed = Vec::with_capacity(sequence.len());
    for reference in sequence {
        let mapping = reference
            .as_mapping()
            .ok_or_else(|| "each reference must be a mapping".to_string())?;
        parsed.push(parse_reference(mapping, project)?);
    }
    Ok(parsed)
}

/// Skip is restricted to value and environment parameters: it has to be
/// decidable before anything deploys.
fn resolve_skip(skip: Option<&SkipDto>, coordinate: &Coordinate) -> Result<bool, ProjectError> {
    let invalid = || ProjectError::InvalidSkip {
        coordinate: coordinate.clone(),
    };

    match skip {
        None => Ok(false),
        Some(SkipDto::Literal(value)) => Ok(*value),
        Some(SkipDto::Parameter(raw)) => {
            let mapping = raw.as_mapping().ok_or_else(invalid)?;
            let kind = mapping
                .get("type")
                .and_then(serde_yaml::Value::as_str)
                .unwrap_or("value");
            match kind {
                "value" => mapping
                    .get("value")
                    .and_then(serde_yaml::Value::as_bool)
                    .ok_or_else(invalid),
                "environment" => {
                    let variable = mapping
                        .get("name")
                        .and_then(serde_yaml::Value::as_str)
                        .ok_or_else(invalid)?;
                    let default = mapping
                        .get("default")
                        .and_then(serde_yaml::Value::as_str)
                        .map(ToOwned::to_owned);
                    let text = env::var(variable).ok().or(default).ok_or_else(invalid)?;
                    parse_bool(&text).ok_or_else(invalid)
                }
                _ => Err(invalid()),
            }
        }
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn yaml_to_json(value: &serde_yaml::Value) -> Result<serde_json::Value, String> {
    serde_json::to_value(value).map_err(|error| format!("not representable as JSON: {error}"))
}
