use std::collections::BTreeMap;
use std::env;
use std::path::Path;

use serde_json::Value;
use strata_domain::{Coordinate, Parameter, ParameterReference};

use crate::error::ResolveError;
use crate::fs_util::FileAccess;
use crate::template;

/// Properties produced by the deploys that already ran in this environment,
/// keyed by coordinate. Written only by the environment's own deploy task;
/// environments never share a registry.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entries: BTreeMap<Coordinate, BTreeMap<String, Value>>,
}

impl EntityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, coordinate: Coordinate, properties: BTreeMap<String, Value>) {
        self.entries.insert(coordinate, properties);
    }

    #[must_use]
    pub fn property(&self, coordinate: &Coordinate, property: &str) -> Option<&Value> {
        self.entries.get(coordinate)?.get(property)
    }

    #[must_use]
    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.entries.contains_key(coordinate)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything one parameter resolution may look at. A parameter only reads
/// the registry entries and peers its declared references name.
pub struct ResolveContext<'a> {
    pub registry: &'a EntityRegistry,
    pub coordinate: &'a Coordinate,
    /// Parameters of the same config resolved earlier in sort order.
    pub peers: &'a BTreeMap<String, Value>,
    pub files: &'a dyn FileAccess,
    /// Directory file parameters resolve their relative paths against.
    pub base_dir: &'a Path,
}

impl ResolveContext<'_> {
    fn lookup(
        &self,
        parameter: &str,
        reference: &ParameterReference,
    ) -> Result<Value, ResolveError> {
        let value = if reference.config == *self.coordinate {
            self.peers.get(&reference.property)
        } else {
            self.registry.property(&reference.config, &reference.property)
        };

        value
            .cloned()
            .ok_or_else(|| ResolveError::ReferenceUnresolved {
                config: self.coordinate.clone(),
                parameter: parameter.to_string(),
                reference: reference.clone(),
            })
    }

    fn reference_values(
        &self,
        parameter: &str,
        references: &[ParameterReference],
    ) -> Result<BTreeMap<String, Value>, ResolveError> {
        let mut values = BTreeMap::new();
        for reference in references {
            values.insert(reference.property.clone(), self.lookup(parameter, reference)?);
        }
        Ok(values)
    }
}

/// Resolve one parameter to its concrete value.
pub fn resolve_parameter(
    name: &str,
    parameter: &Parameter,
    ctx: &ResolveContext<'_>,
) -> Result<Value, ResolveError> {
    match parameter {
        Parameter::Value { value } => Ok(value.clone()),
        Parameter::Environment {
            name: variable,
            default,
        } => match env::var(variable) {
            Ok(value) => Ok(Value::String(value)),
            Err(_) => default.clone().map(Value::String).ok_or_else(|| {
                ResolveError::EnvVarMissing {
                    config: ctx.coordinate.clone(),
                    parameter: name.to_string(),
                    name: variable.clone(),
                }
            }),
        },
        Parameter::Reference { reference } => ctx.lookup(name, reference),
        Parameter::File {
            path,
            escape,
            references,
        } => {
            let full_path = if path.is_absolute() {
                path.clone()
            } else {
                crate::fs_util::normalize_path(&ctx.base_dir.join(path))
            };
            let content =
                ctx.files
                    .read_to_string(&full_path)
                    .map_err(|source| ResolveError::FileMissing {
                        config: ctx.coordinate.clone(),
                        parameter: name.to_string(),
                        path: full_path.clone(),
                        source,
                    })?;

            let content = if *escape {
                json_escape(&content)
            } else {
                content
            };

            let values = ctx.reference_values(name, references)?;
            template::render(&content, &values).map_err(|source| {
                ResolveError::TemplateRenderFailed {
                    config: ctx.coordinate.clone(),
                    what: format!("file parameter {name:?}"),
                    source,
                }
            })
            .map(Value::String)
        }
        Parameter::Compound { format, references } => {
            let values = ctx.reference_values(name, references)?;
            template::render(format, &values)
                .map_err(|source| ResolveError::TemplateRenderFailed {
                    config: ctx.coordinate.clone(),
                    what: format!("compound parameter {name:?}"),
                    source,
                })
                .map(Value::String)
        }
        Parameter::List { values } => {
            let mut resolved = Vec::with_capacity(values.len());
            for element in values {
                resolved.push(resolve_parameter(name, element, ctx)?);
            }
            Ok(Value::Array(resolved))
        }
    }
}

/// Escape text for embedding inside a JSON string literal. The serializer
/// already knows every escape rule; reuse it and strip its outer quotes.
fn json_escape(content: &str) -> String {
    let quoted = Value::String(content.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}
