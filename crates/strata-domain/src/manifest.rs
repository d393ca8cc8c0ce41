use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A secret resolved from the process environment at manifest load time. The
/// variable name is kept for round-tripping; the value never leaves memory
/// and is excluded from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    pub name: String,
    value: String,
}

impl Secret {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentKind {
    Classic,
    Platform,
}

impl fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classic => write!(f, "classic"),
            Self::Platform => write!(f, "platform"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub client_id: Secret,
    pub client_secret: Secret,
    pub token_endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Auth {
    pub token: Option<Secret>,
    pub oauth: Option<OAuthCredentials>,
}

/// One addressable target tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentDefinition {
    pub name: String,
    pub url: String,
    pub kind: EnvironmentKind,
    pub group: String,
    pub auth: Auth,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDefinition {
    pub name: String,
    pub path: PathBuf,
}

/// The top-level declarative document: which projects to load and which
/// environments to address. Parsed once, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Manifest {
    pub projects: Vec<ProjectDefinition>,
    pub environments: BTreeMap<String, EnvironmentDefinition>,
}

impl Manifest {
    #[must_use]
    pub fn environment_names(&self) -> Vec<String> {
        self.environments.keys().cloned().collect()
    }
}
