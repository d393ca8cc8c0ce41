use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;

/// A pointer from one parameter to the resolved property of another config,
/// or to a sibling parameter of the same config.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterReference {
    pub config: Coordinate,
    pub property: String,
}

impl ParameterReference {
    #[must_use]
    pub fn new(config: Coordinate, property: impl Into<String>) -> Self {
        Self {
            config,
            property: property.into(),
        }
    }
}

impl std::fmt::Display for ParameterReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.config, self.property)
    }
}

/// A typed value producer bound into a template slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Parameter {
    Value {
        value: serde_json::Value,
    },
    Environment {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    Reference {
        #[serde(flatten)]
        reference: ParameterReference,
    },
    File {
        path: PathBuf,
        #[serde(default = "default_escape")]
        escape: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        references: Vec<ParameterReference>,
    },
    Compound {
        format: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        references: Vec<ParameterReference>,
    },
    List {
        values: Vec<Parameter>,
    },
}

const fn default_escape() -> bool {
    true
}

impl Parameter {
    #[must_use]
    pub fn value(value: impl Into<serde_json::Value>) -> Self {
        Self::Value {
            value: value.into(),
        }
    }

    /// All references this parameter declares. Resolution may only read the
    /// registry entries and peer parameters named here.
    #[must_use]
    pub fn references(&self) -> Vec<ParameterReference> {
        match self {
            Self::Value { .. } | Self::Environment { .. } => Vec::new(),
            Self::Reference { reference } => vec![reference.clone()],
            Self::File { references, .. } | Self::Compound { references, .. } => {
                references.clone()
            }
            Self::List { values } => values.iter().flat_map(Self::references).collect(),
        }
    }

    #[must_use]
    pub fn references_property_of(&self, config: &Coordinate, property: &str) -> bool {
        self.references()
            .iter()
            .any(|reference| reference.config == *config && reference.property == property)
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Value { .. } => "value",
            Self::Environment { .. } => "environment",
            Self::Reference { .. } => "reference",
            Self::File { .. } => "file",
            Self::Compound { .. } => "compound",
            Self::List { .. } => "list",
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use std::path::PathBuf;

    use super::{Parameter, ParameterReference};
    use crate::coordinate::Coordinate;

    fn reference(id: &str) -> ParameterReference {
        ParameterReference::new(Coordinate::new("infra", "auto-tag", id), "id")
    }

    #[test]
    fn plain_parameters_declare_no_references() {
        assert!(Parameter::value("hello").references().is_empty());
        let env = Parameter::Environment {
            name: "HOME".to_string(),
            default: None,
        };
        assert!(env.references().is_empty());
    }

    #[test]
    fn list_collects_references_of_all_elements() {
        let list = Parameter::List {
            values: vec![
                Parameter::Reference {
                    reference: reference("one"),
                },
                Parameter::value(7),
                Parameter::Reference {
                    reference: reference("two"),
                },
            ],
        };
        let refs = list.references();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].config.config_id, "one");
        assert_eq!(refs[1].config.config_id, "two");
    }

    #[test]
    fn file_parameter_defaults_to_escaped() {
        let parameter: Parameter =
            serde_json::from_value(serde_json::json!({"type": "file", "path": "body.json"}))
                .expect("parse");
        match parameter {
            Parameter::File { path, escape, .. } => {
                assert_eq!(path, PathBuf::from("body.json"));
                assert!(escape);
            }
            other => panic!("unexpected parameter: {other:?}"),
        }
    }

    #[test]
    fn references_property_of_matches_exact_pair() {
        let parameter = Parameter::Reference {
            reference: reference("one"),
        };
        let target = Coordinate::new("infra", "auto-tag", "one");
        assert!(parameter.references_property_of(&target, "id"));
        assert!(!parameter.references_property_of(&target, "name"));
    }
}
