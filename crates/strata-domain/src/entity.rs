use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The remote identity a deploy produced for one config. Stored in the
/// entity registry and read by later parameter resolutions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl Entity {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    /// The property map later resolutions read: `id`, `name`, plus any
    /// type-specific extras the client captured.
    #[must_use]
    pub fn into_properties(self) -> BTreeMap<String, serde_json::Value> {
        let mut properties = self.properties;
        properties.insert("id".to_string(), serde_json::Value::String(self.id));
        properties.insert("name".to_string(), serde_json::Value::String(self.name));
        properties
    }
}

/// One entry of a delete file, addressing a remote object either by config
/// coordinate or by classic-api name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePointer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(rename = "type")]
    pub config_type: String,
    pub identifier: String,
}
