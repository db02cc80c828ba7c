//! Resolves the scopes a request must present from its typed path.
//!
//! The walk goes left to right over the path, appending one requirement per
//! gated segment to an `All` chain; each requirement is an `Any` over the
//! permission entries declared on the element that segment addresses.
//! Expanded navigation properties append their own read requirement to the
//! same chain. Nothing here fails: unresolvable elements and missing or
//! malformed annotations contribute nothing.

use axum::http::Method;

use super::evaluator::ScopesEvaluator;
use super::extractor;
use crate::model::{Annotations, EdmModel, RestrictionKind};
use crate::path::{ExpandClause, ODataPath, PathSegment};

/// Kind of data access an HTTP method performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Insert,
    Update,
    Delete,
}

impl Access {
    /// `None` for methods that carry no restriction (HEAD, OPTIONS, ...).
    pub fn from_method(method: &Method) -> Option<Self> {
        match method.as_str() {
            "GET" => Some(Access::Read),
            "POST" => Some(Access::Insert),
            "PUT" | "PATCH" | "MERGE" => Some(Access::Update),
            "DELETE" => Some(Access::Delete),
            _ => None,
        }
    }

    /// Collection, singleton and navigation-level CRUD.
    fn source_kind(self) -> RestrictionKind {
        match self {
            Access::Read => RestrictionKind::Read,
            Access::Insert => RestrictionKind::Insert,
            Access::Update => RestrictionKind::Update,
            Access::Delete => RestrictionKind::Delete,
        }
    }

    /// CRUD on an entity addressed by key. POST against an existing entity
    /// (only reachable through a link request) updates it.
    fn entity_kind(self) -> RestrictionKind {
        match self {
            Access::Read => RestrictionKind::ReadByKey,
            Access::Insert | Access::Update => RestrictionKind::Update,
            Access::Delete => RestrictionKind::Delete,
        }
    }

    /// Access to a property of a singleton: reads are reads, everything
    /// else updates the owner.
    fn property_kind(self) -> RestrictionKind {
        match self {
            Access::Read => RestrictionKind::Read,
            _ => RestrictionKind::Update,
        }
    }

    /// Access to a property of an entity addressed by key.
    fn entity_property_kind(self) -> RestrictionKind {
        match self {
            Access::Read => RestrictionKind::ReadByKey,
            _ => RestrictionKind::Update,
        }
    }
}

/// Build the scope requirement for one request.
pub fn resolve(
    model: &EdmModel,
    method: &Method,
    path: &ODataPath,
    expand: Option<&ExpandClause>,
) -> ScopesEvaluator {
    let resolver = Resolver {
        model,
        access: Access::from_method(method),
    };
    let chain = resolver.resolve(path, expand);

    tracing::trace!(%method, %path, requirement = %chain, "resolved scope requirement");
    chain
}

struct Resolver<'m> {
    model: &'m EdmModel,
    access: Option<Access>,
}

impl<'m> Resolver<'m> {
    fn resolve(&self, path: &ODataPath, expand: Option<&ExpandClause>) -> ScopesEvaluator {
        let segments = path.segments();
        let mut chain = ScopesEvaluator::all();
        if segments.is_empty() {
            return chain;
        }

        let last = effective_last_index(path);
        let mut visited: Vec<&PathSegment> = Vec::new();
        let mut previous: Option<&PathSegment> = None;

        for (index, segment) in segments.iter().enumerate().take(last + 1) {
            if !is_addressable(segment) {
                continue;
            }
            let parent = previous.replace(segment);
            visited.push(segment);

            let before_key = next_is(segments, index, |next| matches!(next, PathSegment::Key { .. }));
            let before_operation = next_is(segments, index, |next| {
                matches!(next, PathSegment::Operation { import: false, .. })
            });
            let property_access = next_is(segments, index, |next| {
                matches!(
                    next,
                    PathSegment::Property { .. }
                        | PathSegment::NavigationLink { .. }
                        | PathSegment::Navigation { .. }
                )
            });

            match segment {
                PathSegment::EntitySet { name } => {
                    // The key or operation segment that follows carries the permission.
                    if before_key || before_operation {
                        continue;
                    }
                    let Some(set) = self.model.entity_set(name) else {
                        continue;
                    };
                    let permissions = self
                        .navigation_override(&visited, false, Access::source_kind)
                        .unwrap_or_else(|| self.restriction(&set.annotations, Access::source_kind));
                    chain.push(permissions);
                }
                PathSegment::Singleton { name } => {
                    if before_operation {
                        continue;
                    }
                    let Some(singleton) = self.model.singleton(name) else {
                        continue;
                    };
                    let permissions = if property_access {
                        self.restriction(&singleton.annotations, Access::property_kind)
                    } else {
                        self.restriction(&singleton.annotations, Access::source_kind)
                    };
                    chain.push(permissions);
                }
                PathSegment::Key {
                    navigation_source, ..
                } => {
                    if before_operation {
                        continue;
                    }
                    let Some(set) = navigation_source.as_deref().and_then(|name| self.model.entity_set(name)) else {
                        continue;
                    };
                    let entity = if property_access {
                        self.restriction(&set.annotations, Access::entity_property_kind)
                    } else {
                        self.restriction(&set.annotations, Access::entity_kind)
                    };

                    if matches!(parent, Some(PathSegment::Navigation { .. })) {
                        let traversal = if property_access {
                            self.navigation_override(&visited, true, Access::property_kind)
                        } else {
                            self.navigation_override(&visited, true, Access::source_kind)
                        };
                        chain.push(ScopesEvaluator::all_of([entity, traversal.unwrap_or_default()]));
                    } else {
                        chain.push(entity);
                    }
                }
                PathSegment::Navigation {
                    navigation_source, ..
                } => {
                    if before_operation || before_key {
                        continue;
                    }
                    let Some(target) = navigation_source
                        .as_deref()
                        .and_then(|name| self.model.navigation_source(name))
                    else {
                        continue;
                    };
                    let target_permissions = self.restriction(&target.annotations, Access::source_kind);
                    let traversal = self
                        .navigation_override(&visited, false, Access::source_kind)
                        .unwrap_or_default();
                    chain.push(ScopesEvaluator::all_of([target_permissions, traversal]));
                }
                PathSegment::Operation { name, import } => {
                    if let Some(permissions) = self.operation(name, *import) {
                        chain.push(permissions);
                    }
                }
                PathSegment::Property { .. }
                | PathSegment::NavigationLink { .. }
                | PathSegment::TypeCast { .. }
                | PathSegment::Count
                | PathSegment::Value => {}
            }
        }

        if let Some(expand) = expand {
            for expanded in expand.navigation_paths() {
                let mut full = visited.clone();
                full.extend(expanded);
                let by_key = full.iter().any(|segment| matches!(segment, PathSegment::Key { .. }));
                let read = self
                    .root_override(&full, RestrictionKind::Read, by_key)
                    .unwrap_or_default();
                chain.push(read);
            }
        }

        chain
    }

    /// `Any` over the element's entries for the restriction the method maps
    /// to; empty when the method maps to none.
    fn restriction(&self, annotations: &Annotations, kind: fn(Access) -> RestrictionKind) -> ScopesEvaluator {
        match self.access {
            Some(access) => ScopesEvaluator::any_of(extractor::permissions(annotations, kind(access))),
            None => ScopesEvaluator::any(),
        }
    }

    /// Navigation restriction override for the visited path, if one is declared
    /// on the path's root for the restriction the method maps to.
    fn navigation_override(
        &self,
        visited: &[&PathSegment],
        by_key: bool,
        kind: fn(Access) -> RestrictionKind,
    ) -> Option<ScopesEvaluator> {
        if visited.len() <= 1 {
            return None;
        }
        let access = self.access?;
        self.root_override(visited, kind(access), by_key)
    }

    fn root_override(&self, path: &[&PathSegment], kind: RestrictionKind, by_key: bool) -> Option<ScopesEvaluator> {
        let root = match path.first()? {
            PathSegment::EntitySet { name } | PathSegment::Singleton { name } => self.model.navigation_source(name)?,
            _ => return None,
        };
        let names: Vec<&str> = path.iter().filter_map(|segment| segment.navigation_name()).collect();

        extractor::navigation_override(&root.annotations, &names, kind, by_key).map(ScopesEvaluator::any_of)
    }

    /// Operation restrictions of a bound operation, or of the operation an
    /// import exposes (falling back to the import's own annotations).
    fn operation(&self, name: &str, import: bool) -> Option<ScopesEvaluator> {
        let permissions = if import {
            let import = self.model.operation_import(name)?;
            let declared = self
                .model
                .operation(&import.operation)
                .map(|operation| extractor::permissions(&operation.annotations, RestrictionKind::Operation))
                .unwrap_or_default();
            if declared.is_empty() {
                extractor::permissions(&import.annotations, RestrictionKind::Operation)
            } else {
                declared
            }
        } else {
            let operation = self.model.operation(name)?;
            extractor::permissions(&operation.annotations, RestrictionKind::Operation)
        };
        Some(ScopesEvaluator::any_of(permissions))
    }
}

/// Segments that take part in permission resolution and path naming.
fn is_addressable(segment: &PathSegment) -> bool {
    matches!(
        segment,
        PathSegment::EntitySet { .. }
            | PathSegment::Singleton { .. }
            | PathSegment::Navigation { .. }
            | PathSegment::Operation { .. }
            | PathSegment::Key { .. }
            | PathSegment::Property { .. }
    )
}

/// Index of the last segment to resolve. A link request is gated by the
/// entity owning the relationship: walk back from the segment before the end
/// to the nearest key, singleton or navigation.
fn effective_last_index(path: &ODataPath) -> usize {
    let segments = path.segments();
    let mut last = segments.len() - 1;

    if path.is_reference() && segments.len() >= 2 {
        last = segments.len() - 2;
        while last > 0
            && !matches!(
                segments[last],
                PathSegment::Key { .. } | PathSegment::Singleton { .. } | PathSegment::Navigation { .. }
            )
        {
            last -= 1;
        }
    }

    last
}

/// Whether the segment after `index`, looking through one type cast, matches.
fn next_is(segments: &[PathSegment], index: usize, predicate: impl Fn(&PathSegment) -> bool) -> bool {
    match segments.get(index + 1) {
        Some(PathSegment::TypeCast { .. }) => segments.get(index + 2).is_some_and(&predicate),
        Some(next) => predicate(next),
        None => false,
    }
}
