use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

/// A single `{ Scope, RestrictedProperties }` record of a permission entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionScope {
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restricted_properties: Option<String>,
}

impl PermissionScope {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            restricted_properties: None,
        }
    }
}

/// One permission entry declared by a capability restriction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Permission {
    pub scheme_name: String,
    pub scopes: Vec<PermissionScope>,
}

impl Permission {
    pub fn new(scheme_name: impl Into<String>, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            scheme_name: scheme_name.into(),
            scopes: scopes.into_iter().map(PermissionScope::new).collect(),
        }
    }

    /// Satisfied when any declared scope was presented.
    pub fn allows_scopes(&self, scopes: &HashSet<String>) -> bool {
        self.scopes.iter().any(|declared| scopes.contains(&declared.scope))
    }
}

/// Boolean expression over permission entries.
///
/// Both combinators are vacuously true when empty: an element without a
/// declared restriction contributes an empty `Any`, which lets unannotated
/// resources stay open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScopesEvaluator {
    Permission(Permission),
    Any { evaluators: Vec<ScopesEvaluator> },
    All { evaluators: Vec<ScopesEvaluator> },
}

impl Default for ScopesEvaluator {
    fn default() -> Self {
        Self::any()
    }
}

impl From<Permission> for ScopesEvaluator {
    fn from(permission: Permission) -> Self {
        Self::Permission(permission)
    }
}

impl ScopesEvaluator {
    pub fn any() -> Self {
        Self::Any { evaluators: Vec::new() }
    }

    pub fn all() -> Self {
        Self::All { evaluators: Vec::new() }
    }

    /// `Any` over the given permission entries.
    pub fn any_of(permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self::Any {
            evaluators: permissions.into_iter().map(Self::Permission).collect(),
        }
    }

    pub fn all_of(evaluators: impl IntoIterator<Item = ScopesEvaluator>) -> Self {
        Self::All {
            evaluators: evaluators.into_iter().collect(),
        }
    }

    /// Add a child to a combinator. A leaf is first wrapped in an `Any` so
    /// that adding to it never changes its own meaning.
    pub fn push(&mut self, evaluator: impl Into<ScopesEvaluator>) {
        match self {
            Self::Any { evaluators } | Self::All { evaluators } => evaluators.push(evaluator.into()),
            Self::Permission(_) => {
                let leaf = std::mem::take(self);
                *self = Self::Any {
                    evaluators: vec![leaf, evaluator.into()],
                };
            }
        }
    }

    pub fn extend<I, E>(&mut self, evaluators: I)
    where
        I: IntoIterator<Item = E>,
        E: Into<ScopesEvaluator>,
    {
        for evaluator in evaluators {
            self.push(evaluator);
        }
    }

    pub fn allows_scopes(&self, scopes: &HashSet<String>) -> bool {
        match self {
            Self::Permission(permission) => permission.allows_scopes(scopes),
            Self::Any { evaluators } => {
                evaluators.is_empty() || evaluators.iter().any(|evaluator| evaluator.allows_scopes(scopes))
            }
            Self::All { evaluators } => evaluators.iter().all(|evaluator| evaluator.allows_scopes(scopes)),
        }
    }

    /// Whether a caller presenting no scopes at all is admitted.
    pub fn is_unrestricted(&self) -> bool {
        self.allows_scopes(&HashSet::new())
    }
}

impl fmt::Display for ScopesEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, name: &str, evaluators: &[ScopesEvaluator]) -> fmt::Result {
            write!(f, "{name}[")?;
            for (index, evaluator) in evaluators.iter().enumerate() {
                if index > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{evaluator}")?;
            }
            f.write_str("]")
        }

        match self {
            Self::Permission(permission) => {
                let scopes: Vec<&str> = permission.scopes.iter().map(|s| s.scope.as_str()).collect();
                write!(f, "{{{}}}", scopes.join(", "))
            }
            Self::Any { evaluators } => list(f, "any", evaluators),
            Self::All { evaluators } => list(f, "all", evaluators),
        }
    }
}
