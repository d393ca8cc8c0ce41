use std::io;
use std::path::PathBuf;

use strata_domain::{Coordinate, ParameterReference};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse manifest: {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("unsupported manifest version {version:?} (supported: {supported})")]
    UnsupportedVersion { version: String, supported: &'static str },
    #[error("manifest declares no environment groups but they are required")]
    EnvironmentGroupsRequired,
    #[error("requested group {group:?} is not defined in the manifest")]
    UnknownGroup { group: String },
    #[error("requested environment {environment:?} is not defined in the manifest")]
    UnknownEnvironment { environment: String },
    #[error("no environment is left after applying the group/environment filters")]
    NoEnvironmentSelected,
    #[error("environment {environment}: {field} names environment variable {variable:?} which is not set")]
    MissingSecret {
        environment: String,
        field: &'static str,
        variable: String,
    },
    #[error("environment {environment}: {field} is invalid: {reason}")]
    InvalidField {
        environment: String,
        field: &'static str,
        reason: String,
    },
    #[error("duplicate environment name {environment:?}")]
    DuplicateEnvironment { environment: String },
    #[error("failed to write manifest: {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize manifest")]
    Serialize {
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("project path does not exist: {path}")]
    RootDoesNotExist { path: PathBuf },
    #[error("failed while walking project directory")]
    Walk {
        #[source]
        source: walkdir::Error,
    },
    #[error("found API directories next to non-API directories in {parent}")]
    MixedLayout { parent: PathBuf },
    #[error("failed to read config file: {path}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file: {path}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{path}: unknown config type {type_name:?}")]
    UnknownType { path: PathBuf, type_name: String },
    #[error("{coordinate}: parameter {parameter:?} has unknown kind {kind:?}")]
    UnknownParameterKind {
        coordinate: Coordinate,
        parameter: String,
        kind: String,
    },
    #[error("{coordinate}: parameter {parameter:?} is invalid: {reason}")]
    InvalidParameter {
        coordinate: Coordinate,
        parameter: String,
        reason: String,
    },
    #[error("{coordinate}: failed to read template {path}")]
    TemplateUnreadable {
        coordinate: Coordinate,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path}: config declares no type and sits outside any API directory")]
    TypeMissing { path: PathBuf },
    #[error("{coordinate}: classic API configs require a name parameter")]
    NameMissing { coordinate: Coordinate },
    #[error("duplicate coordinate {coordinate}")]
    DuplicateCoordinate { coordinate: Coordinate },
    #[error("{coordinate}: skip must be a value or environment parameter resolving to a boolean")]
    InvalidSkip { coordinate: Coordinate },
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{coordinate} targets environment {environment:?} which is not defined in the manifest")]
    UndefinedEnvironment {
        coordinate: Coordinate,
        environment: String,
    },
    #[error("{coordinate} needs platform capabilities but environment {environment:?} is a classic environment")]
    PlatformRequired {
        coordinate: Coordinate,
        environment: String,
    },
    #[error("environment {environment:?} lacks {needed} auth required by {coordinate}")]
    AuthInsufficient {
        coordinate: Coordinate,
        environment: String,
        needed: &'static str,
    },
    #[error("environment {environment:?} declares more than one openpipeline config of kind {kind:?}: {}", join_coordinates(.coordinates))]
    DuplicateOpenPipelineKind {
        environment: String,
        kind: String,
        coordinates: Vec<Coordinate>,
    },
}

#[derive(Debug, Error)]
pub enum SortError {
    #[error("{environment}:{config}: parameter {parameter:?} is part of a circular dependency. check parameter dependencies: {}", join_references(.depends_on))]
    CircularParameter {
        config: Coordinate,
        environment: String,
        parameter: String,
        depends_on: Vec<ParameterReference>,
    },
    #[error("{environment}:{config}: is part of a circular dependency. depends on: {}", join_coordinates(.depends_on))]
    CircularConfig {
        config: Coordinate,
        environment: String,
        depends_on: Vec<Coordinate>,
    },
    #[error("{environment}:{project}: is part of a circular dependency. check project dependencies: {}", .depends_on.join(", "))]
    CircularProject {
        project: String,
        environment: String,
        depends_on: Vec<String>,
    },
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template references unknown key {key:?}")]
    MissingKey { key: String },
    #[error("unknown template directive {directive:?}; only {{{{ .name }}}} placeholders are supported")]
    UnknownDirective { directive: String },
    #[error("unterminated {{{{ placeholder")]
    UnterminatedPlaceholder,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{config}: parameter {parameter:?} references {reference} which was not resolved")]
    ReferenceUnresolved {
        config: Coordinate,
        parameter: String,
        reference: ParameterReference,
    },
    #[error("{config}: parameter {parameter:?} reads environment variable {name:?} which is not set")]
    EnvVarMissing {
        config: Coordinate,
        parameter: String,
        name: String,
    },
    #[error("{config}: parameter {parameter:?} reads missing file {path}")]
    FileMissing {
        config: Coordinate,
        parameter: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{config}: failed to render {what}")]
    TemplateRenderFailed {
        config: Coordinate,
        what: String,
        #[source]
        source: TemplateError,
    },
    #[error("{config}: the name parameter must resolve to a non-empty string")]
    EmptyName { config: Coordinate },
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("deployment to {} failed", .environments.join(", "))]
    EnvironmentsFailed { environments: Vec<String> },
    #[error("deployment to {environment} was cancelled")]
    Cancelled { environment: String },
}

#[derive(Debug, Error)]
pub enum DeleteError {
    #[error("failed to read delete file: {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("delete file is empty: {path}")]
    Empty { path: PathBuf },
    #[error("failed to parse delete file: {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid delete entry `{value}` on index `{index}`: {reason}")]
    InvalidEntry {
        value: String,
        index: usize,
        reason: String,
    },
    #[error("failed to delete {count} object(s) from {environment}")]
    Failed { environment: String, count: usize },
}

fn join_coordinates(coordinates: &[Coordinate]) -> String {
    coordinates
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_references(references: &[ParameterReference]) -> String {
    references
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
