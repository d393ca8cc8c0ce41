use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique address of one configuration unit across the whole load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Coordinate {
    pub project: String,
    #[serde(rename = "type")]
    pub config_type: String,
    #[serde(rename = "configId")]
    pub config_id: String,
}

impl Coordinate {
    #[must_use]
    pub fn new(
        project: impl Into<String>,
        config_type: impl Into<String>,
        config_id: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            config_type: config_type.into(),
            config_id: config_id.into(),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.project, self.config_type, self.config_id)
    }
}
