//! Resource model: the metadata graph requests are resolved against.
//!
//! The model is built once at startup (usually from a JSON document, see
//! [`EdmModel::from_path`]) and shared read-only between requests. Capability
//! annotations are kept as raw JSON values; interpreting them is the job of
//! [`crate::authz::extractor`], which treats anything it cannot understand as
//! "no restriction".

pub mod capabilities;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use capabilities::RestrictionKind;

/// Annotations on one element, keyed by fully qualified term name.
pub type Annotations = BTreeMap<String, Value>;

#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("failed to read model file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid model document at `{}`: {}", .0.path(), .0.inner())]
    Parse(#[from] serde_path_to_error::Error<serde_json::Error>),
    #[error("{owner} refers to unknown type `{name}`")]
    UnknownType { owner: String, name: String },
    #[error("{owner} binds navigation property `{property}` to unknown navigation source `{target}`")]
    UnknownBindingTarget {
        owner: String,
        property: String,
        target: String,
    },
    #[error("operation import `{import}` refers to unknown operation `{operation}`")]
    UnknownOperation { import: String, operation: String },
    #[error("`{0}` is declared both as an entity set and as a singleton")]
    DuplicateNavigationSource(String),
    #[error("type `{0}` has a cyclic base type chain")]
    CyclicBaseType(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdmModel {
    pub namespace: String,
    #[serde(default)]
    pub entity_types: BTreeMap<String, EntityType>,
    #[serde(default)]
    pub complex_types: BTreeMap<String, ComplexType>,
    #[serde(default)]
    pub entity_sets: BTreeMap<String, NavigationSource>,
    #[serde(default)]
    pub singletons: BTreeMap<String, NavigationSource>,
    #[serde(default)]
    pub operations: BTreeMap<String, Operation>,
    #[serde(default)]
    pub operation_imports: BTreeMap<String, OperationImport>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityType {
    #[serde(default)]
    pub key: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_type: Option<String>,
    /// Structural properties: name to type name (`Edm.String`, or a complex type).
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub navigation_properties: BTreeMap<String, NavigationProperty>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplexType {
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationProperty {
    /// Target entity type.
    pub target: String,
    #[serde(default)]
    pub collection: bool,
}

/// An entity set or a singleton.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NavigationSource {
    pub entity_type: String,
    /// Navigation property name to the entity set or singleton it is bound to.
    #[serde(default)]
    pub navigation_bindings: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: Annotations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    #[default]
    Function,
    Action,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub kind: OperationKind,
    /// Binding entity type; `None` for unbound operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_to: Option<String>,
    #[serde(default)]
    pub collection_bound: bool,
    #[serde(default)]
    pub annotations: Annotations,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationImport {
    pub operation: String,
    #[serde(default)]
    pub annotations: Annotations,
}

impl EdmModel {
    pub fn from_json_str(text: &str) -> Result<Self, ModelError> {
        let de = &mut serde_json::Deserializer::from_str(text);
        let model: EdmModel = serde_path_to_error::deserialize(de)?;
        model.validate()?;
        Ok(model)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model = Self::from_json_str(&text)?;

        tracing::info!(
            path = %path.display(),
            entity_sets = model.entity_sets.len(),
            singletons = model.singletons.len(),
            operations = model.operations.len(),
            "resource model loaded"
        );

        Ok(model)
    }

    /// Check that every reference inside the model resolves.
    pub fn validate(&self) -> Result<(), ModelError> {
        for (name, ty) in &self.entity_types {
            if let Some(base) = &ty.base_type {
                if self.entity_type(base).is_none() {
                    return Err(ModelError::UnknownType {
                        owner: format!("entity type `{name}`"),
                        name: base.clone(),
                    });
                }
            }
            if self.base_chain(name).count() > self.entity_types.len() {
                return Err(ModelError::CyclicBaseType(name.clone()));
            }
            for (nav_name, nav) in &ty.navigation_properties {
                if self.entity_type(&nav.target).is_none() {
                    return Err(ModelError::UnknownType {
                        owner: format!("navigation property `{name}/{nav_name}`"),
                        name: nav.target.clone(),
                    });
                }
            }
        }

        let sources = self
            .entity_sets
            .iter()
            .map(|(name, source)| ("entity set", name, source))
            .chain(self.singletons.iter().map(|(name, source)| ("singleton", name, source)));
        for (label, name, source) in sources {
            if self.entity_type(&source.entity_type).is_none() {
                return Err(ModelError::UnknownType {
                    owner: format!("{label} `{name}`"),
                    name: source.entity_type.clone(),
                });
            }
            for (property, target) in &source.navigation_bindings {
                if self.navigation_source(target).is_none() {
                    return Err(ModelError::UnknownBindingTarget {
                        owner: format!("{label} `{name}`"),
                        property: property.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        if let Some(name) = self.entity_sets.keys().find(|name| self.singletons.contains_key(*name)) {
            return Err(ModelError::DuplicateNavigationSource(name.clone()));
        }

        for (name, operation) in &self.operations {
            if let Some(bound) = &operation.bound_to {
                if self.entity_type(bound).is_none() {
                    return Err(ModelError::UnknownType {
                        owner: format!("operation `{name}`"),
                        name: bound.clone(),
                    });
                }
            }
        }

        for (name, import) in &self.operation_imports {
            if self.operation(&import.operation).is_none() {
                return Err(ModelError::UnknownOperation {
                    import: name.clone(),
                    operation: import.operation.clone(),
                });
            }
        }

        Ok(())
    }

    /// Strip this model's namespace from a qualified name, if present.
    pub fn unqualify<'a>(&self, name: &'a str) -> &'a str {
        name.strip_prefix(self.namespace.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(name)
    }

    pub fn entity_type(&self, name: &str) -> Option<&EntityType> {
        self.entity_types.get(self.unqualify(name))
    }

    pub fn complex_type(&self, name: &str) -> Option<&ComplexType> {
        self.complex_types.get(self.unqualify(name))
    }

    pub fn entity_set(&self, name: &str) -> Option<&NavigationSource> {
        self.entity_sets.get(name)
    }

    pub fn singleton(&self, name: &str) -> Option<&NavigationSource> {
        self.singletons.get(name)
    }

    /// An entity set or singleton; the two share one namespace.
    pub fn navigation_source(&self, name: &str) -> Option<&NavigationSource> {
        self.entity_set(name).or_else(|| self.singleton(name))
    }

    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.get(self.unqualify(name))
    }

    pub fn operation_import(&self, name: &str) -> Option<&OperationImport> {
        self.operation_imports.get(name)
    }

    /// `name` followed by its base types, most derived first.
    pub fn base_chain<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let limit = self.entity_types.len() + 1;
        std::iter::successors(Some(self.unqualify(name)), move |current| {
            self.entity_types
                .get(*current)
                .and_then(|ty| ty.base_type.as_deref())
                .map(|base| self.unqualify(base))
        })
        .take(limit + 1)
    }

    /// Whether `derived` is `base` or inherits from it.
    pub fn derives_from(&self, derived: &str, base: &str) -> bool {
        let base = self.unqualify(base);
        self.base_chain(derived).any(|name| name == base)
    }

    /// Type name of a structural property on an entity or complex type,
    /// including inherited properties.
    pub fn structural_property(&self, type_name: &str, property: &str) -> Option<&str> {
        if let Some(complex) = self.complex_type(type_name) {
            return complex.properties.get(property).map(String::as_str);
        }
        self.base_chain(type_name)
            .filter_map(|name| self.entity_types.get(name))
            .find_map(|ty| ty.properties.get(property))
            .map(String::as_str)
    }

    pub fn navigation_property(&self, type_name: &str, property: &str) -> Option<&NavigationProperty> {
        self.base_chain(type_name)
            .filter_map(|name| self.entity_types.get(name))
            .find_map(|ty| ty.navigation_properties.get(property))
    }

    /// Every navigation property name visible on an entity type.
    pub fn navigation_property_names(&self, type_name: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .base_chain(type_name)
            .filter_map(|name| self.entity_types.get(name))
            .flat_map(|ty| ty.navigation_properties.keys().map(String::as_str))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Bound operation invocable on `binding_type` (collection or single).
    pub fn bound_operation(&self, name: &str, binding_type: &str, collection: bool) -> Option<&str> {
        let (key, operation) = self.operations.get_key_value(self.unqualify(name))?;
        let bound = operation.bound_to.as_deref()?;
        if operation.collection_bound == collection && self.derives_from(binding_type, bound) {
            Some(key.as_str())
        } else {
            None
        }
    }
}
