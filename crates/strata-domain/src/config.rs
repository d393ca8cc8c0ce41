use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::parameter::Parameter;

/// The kind of a deployable unit. Each variant carries only the fields the
/// matching tenant API needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigType {
    ClassicApi {
        api: String,
        single_instance: bool,
    },
    SettingsSchema {
        schema_id: String,
        scope: String,
    },
    Automation {
        resource: AutomationResource,
    },
    Bucket,
    Document {
        document_kind: DocumentKind,
    },
    OpenPipeline {
        pipeline_kind: String,
    },
    Policy,
    Group,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutomationResource {
    Workflow,
    BusinessCalendar,
    SchedulingRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    Dashboard,
    Notebook,
}

impl ConfigType {
    /// Stable name used in coordinates, report records and the project tree.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::ClassicApi { api, .. } => api.clone(),
            Self::SettingsSchema { schema_id, .. } => schema_id.clone(),
            Self::Automation { resource } => match resource {
                AutomationResource::Workflow => "workflow".to_string(),
                AutomationResource::BusinessCalendar => "business-calendar".to_string(),
                AutomationResource::SchedulingRule => "scheduling-rule".to_string(),
            },
            Self::Bucket => "bucket".to_string(),
            Self::Document { document_kind } => match document_kind {
                DocumentKind::Dashboard => "document-dashboard".to_string(),
                DocumentKind::Notebook => "document-notebook".to_string(),
            },
            Self::OpenPipeline { .. } => "openpipeline".to_string(),
            Self::Policy => "policy".to_string(),
            Self::Group => "group".to_string(),
            Self::User => "user".to_string(),
        }
    }

    /// Whether deploying this type needs the platform transport (OAuth).
    #[must_use]
    pub const fn requires_platform(&self) -> bool {
        matches!(
            self,
            Self::Automation { .. }
                | Self::Bucket
                | Self::Document { .. }
                | Self::OpenPipeline { .. }
                | Self::Policy
                | Self::Group
                | Self::User
        )
    }

    #[must_use]
    pub const fn is_classic_api(&self) -> bool {
        matches!(self, Self::ClassicApi { .. })
    }

    #[must_use]
    pub const fn is_settings(&self) -> bool {
        matches!(self, Self::SettingsSchema { .. })
    }
}

/// The JSON payload template of a config. Content is read at load time; the
/// path is kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub path: PathBuf,
    pub content: String,
}

impl Template {
    #[must_use]
    pub fn inline(content: impl Into<String>) -> Self {
        Self {
            path: PathBuf::new(),
            content: content.into(),
        }
    }
}

/// One deployable unit: template + parameters + type, addressed by a
/// coordinate and bound to a single environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub coordinate: Coordinate,
    pub environment: String,
    pub type_: ConfigType,
    pub template: Template,
    pub parameters: BTreeMap<String, Parameter>,
    pub skip: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_object_id: Option<String>,
}

impl Config {
    /// The distinguished parameter holding the remote display name.
    pub const NAME_PARAMETER: &'static str = "name";

    #[must_use]
    pub fn has_dependency_on(&self, other: &Self) -> bool {
        self.parameters
            .values()
            .flat_map(Parameter::references)
            .any(|reference| reference.config == other.coordinate)
    }
}

pub type ConfigsPerType = BTreeMap<String, Vec<Config>>;

/// A named directory tree of configuration definitions, split per target
/// environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub dependencies: BTreeMap<String, Vec<String>>,
    pub configs: BTreeMap<String, ConfigsPerType>,
}

impl Project {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dependencies: BTreeMap::new(),
            configs: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn has_dependency_on(&self, environment: &str, other: &Self) -> bool {
        self.dependencies
            .get(environment)
            .is_some_and(|ids| ids.iter().any(|id| *id == other.id))
    }

    /// All configs of one environment, flattened over the per-type buckets in
    /// stable type order.
    #[must_use]
    pub fn configs_for_environment(&self, environment: &str) -> Vec<&Config> {
        self.configs
            .get(environment)
            .map(|per_type| per_type.values().flatten().collect())
            .unwrap_or_default()
    }
}
