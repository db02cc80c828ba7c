use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::{Method, Uri};
use axum::middleware::Next;
use axum::response::Response;
use percent_encoding::percent_decode_str;

use super::evaluator::ScopesEvaluator;
use super::principal::{Principal, ScopeFinder, ScopeFinderContext};
use super::resolver::resolve;
use super::AuthzMode;
use crate::errors::{AppError, AppResult};
use crate::model::EdmModel;
use crate::path::{ExpandClause, ODataPath};

/// Shared state of the authorization middleware.
#[derive(Clone)]
pub struct ODataAuthorization {
    pub model: Arc<EdmModel>,
    /// Mount point of the OData service; only requests below it are checked.
    pub route_prefix: String,
    pub mode: AuthzMode,
    pub scope_finder: Arc<dyn ScopeFinder>,
}

impl ODataAuthorization {
    pub fn new(model: Arc<EdmModel>, scope_finder: Arc<dyn ScopeFinder>) -> Self {
        Self {
            model,
            route_prefix: String::new(),
            mode: AuthzMode::default(),
            scope_finder,
        }
    }

    pub fn with_route_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.route_prefix = prefix.into();
        self
    }

    pub fn with_mode(mut self, mode: AuthzMode) -> Self {
        self.mode = mode;
        self
    }

    /// The resource path below the route prefix, or `None` when `path` is
    /// outside of it.
    pub fn resource_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        let prefix = self.route_prefix.trim_end_matches('/');
        let rest = path.strip_prefix(prefix)?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        Some(rest.trim_start_matches('/'))
    }

    /// Scope requirement for a request, or `None` when the request does not
    /// address an element of the model.
    ///
    /// The path is matched after percent-decoding, the way the service behind
    /// the gate will route it.
    pub fn requirement(&self, method: &Method, uri: &Uri) -> Option<ScopesEvaluator> {
        let decoded = percent_decode_str(uri.path()).decode_utf8_lossy();
        let resource = self.resource_path(&decoded)?;
        let path = match ODataPath::parse(&self.model, resource) {
            Ok(path) => path,
            Err(err) => {
                tracing::debug!(path = resource, error = %err, "path not modeled; skipping authorization");
                return None;
            }
        };

        // Every occurrence counts, so a repeated option cannot hide an expansion.
        let mut expand = ExpandClause::default();
        for text in expand_options(uri) {
            match ExpandClause::parse(&self.model, &path, &text) {
                Ok(clause) => expand.items.extend(clause.items),
                Err(err) => {
                    tracing::warn!(path = resource, expand = %text, error = %err, "ignoring unparsable $expand");
                }
            }
        }
        let expand = (!expand.is_empty()).then_some(expand);

        Some(resolve(&self.model, method, &path, expand.as_ref()))
    }
}

/// Percent-decoded values of every `$expand` query option of a request URI,
/// in order of appearance.
pub fn expand_options(uri: &Uri) -> Vec<String> {
    match Query::<Vec<(String, String)>>::try_from_uri(uri) {
        Ok(Query(params)) => params
            .into_iter()
            .filter(|(name, _)| name == "$expand")
            .map(|(_, value)| value)
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Enforces the capability restrictions of the addressed resource.
///
/// Usage: `axum::middleware::from_fn_with_state(authz, require_odata_authorization)`
pub async fn require_odata_authorization(
    State(authz): State<ODataAuthorization>,
    request: Request,
    next: Next,
) -> AppResult<Response> {
    if authz.mode == AuthzMode::Off {
        return Ok(next.run(request).await);
    }

    let Some(requirement) = authz.requirement(request.method(), request.uri()) else {
        return Ok(next.run(request).await);
    };

    let (parts, body) = request.into_parts();
    let principal = parts.extensions.get::<Principal>();
    let scopes = authz
        .scope_finder
        .find_scopes(ScopeFinderContext {
            principal,
            headers: &parts.headers,
        })
        .await;

    // Presented scopes identify the caller even without a principal.
    let authenticated = principal.is_some() || !scopes.is_empty();
    let allowed = requirement.allows_scopes(&scopes);
    tracing::debug!(
        method = %parts.method,
        path = %parts.uri.path(),
        allowed,
        requirement = %requirement,
        "odata authorization decision"
    );

    if allowed {
        return Ok(next.run(Request::from_parts(parts, body)).await);
    }

    match authz.mode {
        AuthzMode::Advisory => {
            tracing::warn!(
                method = %parts.method,
                path = %parts.uri.path(),
                requirement = %requirement,
                "advisory mode: request would be denied"
            );
            Ok(next.run(Request::from_parts(parts, body)).await)
        }
        _ if !authenticated => Err(AppError::unauthorized("authentication required")),
        _ => Err(AppError::forbidden("insufficient scopes")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::HeaderScopeFinder;
    use crate::path::fixtures;

    fn authz(prefix: &str) -> ODataAuthorization {
        ODataAuthorization::new(Arc::new(fixtures::model()), Arc::new(HeaderScopeFinder::default()))
            .with_route_prefix(prefix)
    }

    #[test]
    fn strips_the_route_prefix() {
        let authz = authz("/odata/");

        assert_eq!(authz.resource_path("/odata/Customers(1)"), Some("Customers(1)"));
        assert_eq!(authz.resource_path("/odata"), Some(""));
        assert_eq!(authz.resource_path("/odatax/Customers"), None);
        assert_eq!(authz.resource_path("/api/health"), None);
        assert_eq!(self::authz("").resource_path("/Customers"), Some("Customers"));
    }

    #[test]
    fn reads_a_percent_encoded_expand() {
        let uri: Uri = "/odata/Customers?$top=2&%24expand=Orders(%24expand%3DItems)".parse().unwrap();
        assert_eq!(expand_options(&uri), vec!["Orders($expand=Items)".to_string()]);

        let uri: Uri = "/odata/Customers".parse().unwrap();
        assert!(expand_options(&uri).is_empty());
    }

    #[test]
    fn keeps_every_repeated_expand() {
        let uri: Uri = "/odata/Customers?$expand=Orders&$expand=".parse().unwrap();
        assert_eq!(expand_options(&uri), vec!["Orders".to_string(), String::new()]);
    }

    #[test]
    fn encoded_paths_resolve_like_plain_ones() {
        let authz = authz("/odata");
        let method = Method::GET;

        for (plain, encoded) in [
            ("/odata/Customers", "/odata/%43ustomers"),
            ("/odata/Customers(1)", "/odata/Customers%281%29"),
            ("/odata/Customers(1)", "/%6Fdata/Customers(1)"),
        ] {
            let expected = authz.requirement(&method, &plain.parse().unwrap());
            assert!(expected.is_some(), "{plain}");
            assert_eq!(authz.requirement(&method, &encoded.parse().unwrap()), expected, "{encoded}");
        }
    }

    #[test]
    fn unmodeled_requests_have_no_requirement() {
        let authz = authz("/odata");

        assert!(authz.requirement(&Method::GET, &"/odata/Suppliers".parse().unwrap()).is_none());
        assert!(authz.requirement(&Method::GET, &"/odata/".parse().unwrap()).is_none());
        assert!(authz.requirement(&Method::GET, &"/odata/Customers".parse().unwrap()).is_some());
        // A bad $expand is dropped, the path is still checked.
        let uri = "/odata/Customers?$expand=Nope".parse().unwrap();
        assert!(authz.requirement(&Method::GET, &uri).is_some());
    }
}
