use std::collections::HashSet;

use async_trait::async_trait;
use axum::http::HeaderMap;

/// Authenticated caller, inserted into request extensions by whatever
/// authentication layer runs in front of the authorization gate.
#[derive(Debug, Clone, Default)]
pub struct Principal {
    pub subject: String,
    /// `(claim type, value)` pairs; a claim type may repeat.
    pub claims: Vec<(String, String)>,
}

impl Principal {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            claims: Vec::new(),
        }
    }

    pub fn with_claim(mut self, claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.push((claim_type.into(), value.into()));
        self
    }

    pub fn with_claims<I, K, V>(mut self, claims: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.claims
            .extend(claims.into_iter().map(|(claim_type, value)| (claim_type.into(), value.into())));
        self
    }

    pub fn claim_values<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.claims
            .iter()
            .filter(move |(kind, _)| kind == claim_type)
            .map(|(_, value)| value.as_str())
    }
}

/// What a scope finder gets to look at for one request.
#[derive(Debug, Clone, Copy)]
pub struct ScopeFinderContext<'a> {
    pub principal: Option<&'a Principal>,
    pub headers: &'a HeaderMap,
}

/// Produces the scopes the current caller presents.
#[async_trait]
pub trait ScopeFinder: Send + Sync {
    async fn find_scopes(&self, context: ScopeFinderContext<'_>) -> HashSet<String>;
}

/// Reads scopes from the principal's claims of one type.
#[derive(Debug, Clone)]
pub struct ClaimScopeFinder {
    pub claim_type: String,
}

impl ClaimScopeFinder {
    pub const DEFAULT_CLAIM_TYPE: &'static str = "Scope";

    pub fn new(claim_type: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
        }
    }
}

impl Default for ClaimScopeFinder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CLAIM_TYPE)
    }
}

#[async_trait]
impl ScopeFinder for ClaimScopeFinder {
    async fn find_scopes(&self, context: ScopeFinderContext<'_>) -> HashSet<String> {
        context
            .principal
            .map(|principal| principal.claim_values(&self.claim_type).map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Reads scopes from a comma-separated request header. Meant for local
/// development and testing; the header is caller-controlled.
#[derive(Debug, Clone)]
pub struct HeaderScopeFinder {
    pub header: String,
}

impl HeaderScopeFinder {
    pub const DEFAULT_HEADER: &'static str = "Permissions";

    pub fn new(header: impl Into<String>) -> Self {
        Self { header: header.into() }
    }
}

impl Default for HeaderScopeFinder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_HEADER)
    }
}

#[async_trait]
impl ScopeFinder for HeaderScopeFinder {
    async fn find_scopes(&self, context: ScopeFinderContext<'_>) -> HashSet<String> {
        context
            .headers
            .get_all(self.header.as_str())
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|scope| !scope.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn claim_finder_reads_matching_claims() {
        let principal = Principal::new("alice")
            .with_claim("Scope", "Customers.Read")
            .with_claims([("Scope", "Orders.Read"), ("Role", "admin")]);
        let headers = HeaderMap::new();

        let scopes = ClaimScopeFinder::default()
            .find_scopes(ScopeFinderContext {
                principal: Some(&principal),
                headers: &headers,
            })
            .await;

        assert_eq!(scopes.len(), 2);
        assert!(scopes.contains("Orders.Read"));
        assert!(!scopes.contains("admin"));
    }

    #[tokio::test]
    async fn claim_finder_without_principal_finds_nothing() {
        let headers = HeaderMap::new();
        let scopes = ClaimScopeFinder::default()
            .find_scopes(ScopeFinderContext {
                principal: None,
                headers: &headers,
            })
            .await;

        assert!(scopes.is_empty());
    }

    #[tokio::test]
    async fn header_finder_splits_and_trims() {
        let mut headers = HeaderMap::new();
        headers.append("permissions", HeaderValue::from_static("A, B,,"));
        headers.append("permissions", HeaderValue::from_static("C"));

        let scopes = HeaderScopeFinder::default()
            .find_scopes(ScopeFinderContext {
                principal: None,
                headers: &headers,
            })
            .await;

        let expected: HashSet<String> = ["A", "B", "C"].into_iter().map(String::from).collect();
        assert_eq!(scopes, expected);
    }
}
