//! Typed request paths.
//!
//! A request's resource path (`Customers(1)/Orders/$ref`) becomes an
//! [`ODataPath`]: an ordered list of [`PathSegment`]s whose names have been
//! resolved against an [`EdmModel`]. The permission resolver only ever sees
//! this typed form.

mod expand;

use std::fmt;

use serde::Serialize;

use crate::model::EdmModel;

pub use expand::{ExpandClause, ExpandItem};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("resource path is empty")]
    Empty,
    #[error("malformed segment `{0}`")]
    Malformed(String),
    #[error("`{0}` does not match any element of the model")]
    UnknownSegment(String),
    #[error("`{0}` cannot follow the previous segment")]
    UnexpectedSegment(String),
    #[error("`$ref` must follow a navigation property")]
    MisplacedReference,
    #[error("unsupported segment `{0}`")]
    Unsupported(String),
    #[error("malformed $expand: {0}")]
    InvalidExpand(String),
    #[error("$expand is not applicable to this path")]
    ExpandNotApplicable,
}

/// One resolved step of a resource path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PathSegment {
    EntitySet {
        name: String,
    },
    Singleton {
        name: String,
    },
    /// Item access by key; `navigation_source` is the entity set the key
    /// addresses, when the model binds one.
    Key {
        navigation_source: Option<String>,
        key: String,
    },
    Navigation {
        property: String,
        navigation_source: Option<String>,
    },
    /// The `Nav/$ref` pseudo-segment of a relationship-link request.
    NavigationLink {
        property: String,
        navigation_source: Option<String>,
    },
    Operation {
        name: String,
        import: bool,
    },
    Property {
        name: String,
    },
    TypeCast {
        type_name: String,
    },
    Count,
    Value,
}

impl PathSegment {
    pub fn entity_set(name: impl Into<String>) -> Self {
        Self::EntitySet { name: name.into() }
    }

    pub fn singleton(name: impl Into<String>) -> Self {
        Self::Singleton { name: name.into() }
    }

    pub fn key(navigation_source: Option<&str>, key: impl Into<String>) -> Self {
        Self::Key {
            navigation_source: navigation_source.map(str::to_string),
            key: key.into(),
        }
    }

    pub fn navigation(property: impl Into<String>, navigation_source: Option<&str>) -> Self {
        Self::Navigation {
            property: property.into(),
            navigation_source: navigation_source.map(str::to_string),
        }
    }

    /// Name contributed to a navigation path string (`Customers/Orders`).
    pub fn navigation_name(&self) -> Option<&str> {
        match self {
            Self::EntitySet { name } | Self::Singleton { name } => Some(name),
            Self::Navigation { property, .. } => Some(property),
            _ => None,
        }
    }
}

/// Shape of the resource a path ends on, needed to interpret `$expand`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTarget {
    pub entity_type: String,
    pub navigation_source: Option<String>,
    pub collection: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ODataPath {
    segments: Vec<PathSegment>,
    target: Option<PathTarget>,
}

impl ODataPath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self {
            segments,
            target: None,
        }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn target(&self) -> Option<&PathTarget> {
        self.target.as_ref()
    }

    /// Whether this addresses a relationship link rather than a resource.
    pub fn is_reference(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, PathSegment::NavigationLink { .. }))
    }

    /// Parse the resource path part of a request URL (no query string).
    pub fn parse(model: &EdmModel, text: &str) -> Result<Self, PathError> {
        let mut tokens = text.split('/').filter(|token| !token.is_empty());
        let first = tokens.next().ok_or(PathError::Empty)?;

        let mut segments = Vec::new();
        let mut cursor = start(model, first, &mut segments)?;
        for token in tokens {
            cursor = step(model, cursor, token, &mut segments)?;
        }

        let target = match cursor {
            Cursor::Collection {
                entity_type,
                source,
            } => Some(PathTarget {
                entity_type,
                navigation_source: source,
                collection: true,
            }),
            Cursor::Entity {
                entity_type,
                source,
            } => Some(PathTarget {
                entity_type,
                navigation_source: source,
                collection: false,
            }),
            _ => None,
        };

        Ok(Self { segments, target })
    }
}

impl fmt::Display for ODataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            let text = match segment {
                PathSegment::Key { key, .. } => {
                    write!(f, "({key})")?;
                    continue;
                }
                PathSegment::EntitySet { name }
                | PathSegment::Singleton { name }
                | PathSegment::Operation { name, .. }
                | PathSegment::Property { name } => name.as_str(),
                PathSegment::Navigation { property, .. }
                | PathSegment::NavigationLink { property, .. } => property.as_str(),
                PathSegment::TypeCast { type_name } => type_name.as_str(),
                PathSegment::Count => "$count",
                PathSegment::Value => "$value",
            };
            if !first {
                f.write_str("/")?;
            }
            f.write_str(text)?;
            first = false;
        }
        if self.is_reference() {
            f.write_str("/$ref")?;
        }
        Ok(())
    }
}

/// What the path addresses after the segments consumed so far.
enum Cursor {
    Collection {
        entity_type: String,
        source: Option<String>,
    },
    Entity {
        entity_type: String,
        source: Option<String>,
    },
    Complex {
        type_name: String,
    },
    Primitive,
    Done,
}

/// Split `Name(args)` into its name and the text between the parentheses.
fn split_token(token: &str) -> Result<(&str, Option<&str>), PathError> {
    match token.find('(') {
        None if token.contains(')') => Err(PathError::Malformed(token.to_string())),
        None => Ok((token, None)),
        Some(open) => {
            let args = token[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| PathError::Malformed(token.to_string()))?;
            let name = &token[..open];
            if name.is_empty() {
                return Err(PathError::Malformed(token.to_string()));
            }
            Ok((name, Some(args)))
        }
    }
}

fn require_key<'a>(token: &str, args: &'a str) -> Result<&'a str, PathError> {
    let key = args.trim();
    if key.is_empty() {
        Err(PathError::Malformed(token.to_string()))
    } else {
        Ok(key)
    }
}

fn start(model: &EdmModel, token: &str, segments: &mut Vec<PathSegment>) -> Result<Cursor, PathError> {
    let (name, args) = split_token(token)?;

    if let Some(set) = model.entity_set(name) {
        segments.push(PathSegment::entity_set(name));
        let entity_type = model.unqualify(&set.entity_type).to_string();
        return match args {
            None => Ok(Cursor::Collection {
                entity_type,
                source: Some(name.to_string()),
            }),
            Some(args) => {
                segments.push(PathSegment::key(Some(name), require_key(token, args)?));
                Ok(Cursor::Entity {
                    entity_type,
                    source: Some(name.to_string()),
                })
            }
        };
    }

    if let Some(singleton) = model.singleton(name) {
        if args.is_some() {
            return Err(PathError::Malformed(token.to_string()));
        }
        segments.push(PathSegment::singleton(name));
        return Ok(Cursor::Entity {
            entity_type: model.unqualify(&singleton.entity_type).to_string(),
            source: Some(name.to_string()),
        });
    }

    if model.operation_import(name).is_some() {
        segments.push(PathSegment::Operation {
            name: name.to_string(),
            import: true,
        });
        return Ok(Cursor::Done);
    }

    Err(PathError::UnknownSegment(token.to_string()))
}

fn step(
    model: &EdmModel,
    cursor: Cursor,
    token: &str,
    segments: &mut Vec<PathSegment>,
) -> Result<Cursor, PathError> {
    match token {
        "$ref" => return mark_reference(segments),
        "$count" => {
            return match cursor {
                Cursor::Collection { .. } => {
                    segments.push(PathSegment::Count);
                    Ok(Cursor::Done)
                }
                _ => Err(PathError::UnexpectedSegment(token.to_string())),
            };
        }
        "$value" => {
            return match cursor {
                Cursor::Entity { .. } | Cursor::Primitive => {
                    segments.push(PathSegment::Value);
                    Ok(Cursor::Done)
                }
                _ => Err(PathError::UnexpectedSegment(token.to_string())),
            };
        }
        _ if token.starts_with('$') => return Err(PathError::Unsupported(token.to_string())),
        _ => {}
    }

    let (name, args) = split_token(token)?;

    match cursor {
        Cursor::Collection {
            entity_type,
            source,
        } => {
            if let Some(operation) = model.bound_operation(name, &entity_type, true) {
                segments.push(PathSegment::Operation {
                    name: operation.to_string(),
                    import: false,
                });
                return Ok(Cursor::Done);
            }
            if args.is_none() {
                if let Some(cast) = type_cast(model, &entity_type, name) {
                    segments.push(PathSegment::TypeCast {
                        type_name: name.to_string(),
                    });
                    return Ok(Cursor::Collection {
                        entity_type: cast,
                        source,
                    });
                }
            }
            Err(PathError::UnknownSegment(token.to_string()))
        }
        Cursor::Entity {
            entity_type,
            source,
        } => {
            if let Some(property_type) = model.structural_property(&entity_type, name) {
                if args.is_some() {
                    return Err(PathError::Malformed(token.to_string()));
                }
                segments.push(PathSegment::Property {
                    name: name.to_string(),
                });
                return Ok(property_cursor(model, property_type));
            }

            if let Some(navigation) = model.navigation_property(&entity_type, name) {
                let binding = source
                    .as_deref()
                    .and_then(|source| model.navigation_source(source))
                    .and_then(|source| source.navigation_bindings.get(name))
                    .cloned();
                segments.push(PathSegment::navigation(name, binding.as_deref()));
                let target = model.unqualify(&navigation.target).to_string();

                return match (navigation.collection, args) {
                    (true, None) => Ok(Cursor::Collection {
                        entity_type: target,
                        source: binding,
                    }),
                    (true, Some(args)) => {
                        segments.push(PathSegment::key(binding.as_deref(), require_key(token, args)?));
                        Ok(Cursor::Entity {
                            entity_type: target,
                            source: binding,
                        })
                    }
                    (false, None) => Ok(Cursor::Entity {
                        entity_type: target,
                        source: binding,
                    }),
                    (false, Some(_)) => Err(PathError::Malformed(token.to_string())),
                };
            }

            if let Some(operation) = model.bound_operation(name, &entity_type, false) {
                segments.push(PathSegment::Operation {
                    name: operation.to_string(),
                    import: false,
                });
                return Ok(Cursor::Done);
            }

            if args.is_none() {
                if let Some(cast) = type_cast(model, &entity_type, name) {
                    segments.push(PathSegment::TypeCast {
                        type_name: name.to_string(),
                    });
                    return Ok(Cursor::Entity {
                        entity_type: cast,
                        source,
                    });
                }
            }

            Err(PathError::UnknownSegment(token.to_string()))
        }
        Cursor::Complex { type_name } => match model.structural_property(&type_name, name) {
            Some(property_type) if args.is_none() => {
                segments.push(PathSegment::Property {
                    name: name.to_string(),
                });
                Ok(property_cursor(model, property_type))
            }
            _ => Err(PathError::UnknownSegment(token.to_string())),
        },
        Cursor::Primitive | Cursor::Done => Err(PathError::UnexpectedSegment(token.to_string())),
    }
}

fn property_cursor(model: &EdmModel, property_type: &str) -> Cursor {
    if model.complex_type(property_type).is_some() {
        Cursor::Complex {
            type_name: model.unqualify(property_type).to_string(),
        }
    } else {
        Cursor::Primitive
    }
}

/// Resolve a namespace-qualified cast from `current` to a derived entity type.
fn type_cast(model: &EdmModel, current: &str, name: &str) -> Option<String> {
    if !name.contains('.') || model.entity_type(name).is_none() {
        return None;
    }
    model
        .derives_from(name, current)
        .then(|| model.unqualify(name).to_string())
}

/// Turn the trailing navigation (optionally followed by a key) into a link.
fn mark_reference(segments: &mut [PathSegment]) -> Result<Cursor, PathError> {
    let index = match segments {
        [.., PathSegment::Navigation { .. }] => segments.len() - 1,
        [.., PathSegment::Navigation { .. }, PathSegment::Key { .. }] => segments.len() - 2,
        _ => return Err(PathError::MisplacedReference),
    };

    if let PathSegment::Navigation {
        property,
        navigation_source,
    } = segments[index].clone()
    {
        segments[index] = PathSegment::NavigationLink {
            property,
            navigation_source,
        };
    }

    Ok(Cursor::Done)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::model::EdmModel;
    use serde_json::json;

    /// Small model shared by the path and resolver unit tests.
    pub fn model() -> EdmModel {
        let doc = json!({
            "namespace": "Sample",
            "entity_types": {
                "Customer": {
                    "key": ["Id"],
                    "properties": {"Id": "Edm.Int32", "Name": "Edm.String", "Address": "Sample.Address"},
                    "navigation_properties": {
                        "Orders": {"target": "Order", "collection": true},
                        "Favorite": {"target": "Product"}
                    }
                },
                "VipCustomer": {"base_type": "Customer", "properties": {"Tier": "Edm.String"}},
                "Order": {
                    "key": ["Id"],
                    "properties": {"Id": "Edm.Int32", "Total": "Edm.Decimal"},
                    "navigation_properties": {"Items": {"target": "Product", "collection": true}}
                },
                "Product": {"key": ["Id"], "properties": {"Id": "Edm.Int32", "Name": "Edm.String"}}
            },
            "complex_types": {"Address": {"properties": {"City": "Edm.String"}}},
            "entity_sets": {
                "Customers": {
                    "entity_type": "Customer",
                    "navigation_bindings": {"Orders": "Orders", "Favorite": "Products"}
                },
                "Orders": {"entity_type": "Order", "navigation_bindings": {"Items": "Products"}},
                "Products": {"entity_type": "Product"}
            },
            "singletons": {
                "TopCustomer": {
                    "entity_type": "Customer",
                    "navigation_bindings": {"Orders": "Orders"}
                }
            },
            "operations": {
                "Rank": {"kind": "function", "bound_to": "Customer", "collection_bound": true},
                "Promote": {"kind": "action", "bound_to": "Customer"},
                "ResetDataSource": {"kind": "action"}
            },
            "operation_imports": {"ResetData": {"operation": "ResetDataSource"}}
        });
        EdmModel::from_json_str(&doc.to_string()).expect("fixture model is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::model;
    use super::*;

    #[test]
    fn parses_key_navigation_and_key() {
        let model = model();
        let path = ODataPath::parse(&model, "/Customers(1)/Orders(5)").unwrap();

        assert_eq!(
            path.segments(),
            &[
                PathSegment::entity_set("Customers"),
                PathSegment::key(Some("Customers"), "1"),
                PathSegment::navigation("Orders", Some("Orders")),
                PathSegment::key(Some("Orders"), "5"),
            ]
        );
        let target = path.target().unwrap();
        assert_eq!(target.entity_type, "Order");
        assert!(!target.collection);
        assert_eq!(path.to_string(), "Customers(1)/Orders(5)");
    }

    #[test]
    fn reference_turns_navigation_into_link() {
        let model = model();

        let path = ODataPath::parse(&model, "Customers(1)/Orders(5)/$ref").unwrap();
        assert!(path.is_reference());
        assert!(matches!(path.segments()[2], PathSegment::NavigationLink { .. }));
        assert_eq!(path.to_string(), "Customers(1)/Orders(5)/$ref");

        let err = ODataPath::parse(&model, "Customers(1)/$ref").unwrap_err();
        assert_eq!(err, PathError::MisplacedReference);
    }

    #[test]
    fn resolves_casts_operations_and_properties() {
        let model = model();

        let path = ODataPath::parse(&model, "Customers/Sample.VipCustomer/Sample.Rank").unwrap();
        assert!(matches!(path.segments()[1], PathSegment::TypeCast { .. }));
        assert_eq!(
            path.segments()[2],
            PathSegment::Operation {
                name: "Rank".into(),
                import: false
            }
        );

        let path = ODataPath::parse(&model, "TopCustomer/Address/City/$value").unwrap();
        assert_eq!(path.len(), 4);
        assert_eq!(path.segments()[3], PathSegment::Value);
        assert!(path.target().is_none());

        let path = ODataPath::parse(&model, "ResetData").unwrap();
        assert_eq!(
            path.segments(),
            &[PathSegment::Operation {
                name: "ResetData".into(),
                import: true
            }]
        );
    }

    #[test]
    fn rejects_unknown_and_misplaced_segments() {
        let model = model();

        assert_eq!(ODataPath::parse(&model, "/"), Err(PathError::Empty));
        assert_eq!(
            ODataPath::parse(&model, "Suppliers"),
            Err(PathError::UnknownSegment("Suppliers".into()))
        );
        assert_eq!(
            ODataPath::parse(&model, "Customers(1)/Name/Length"),
            Err(PathError::UnexpectedSegment("Length".into()))
        );
        assert_eq!(
            ODataPath::parse(&model, "Customers()"),
            Err(PathError::Malformed("Customers()".into()))
        );
        assert_eq!(
            ODataPath::parse(&model, "Customers/$metadata"),
            Err(PathError::Unsupported("$metadata".into()))
        );
    }
}
