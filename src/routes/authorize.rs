//! Decision endpoints.
//!
//! `POST /api/authorize` answers "would this request be allowed with these
//! scopes" for callers that enforce access themselves. The forward-auth
//! handler is mounted below the OData route prefix behind the authorization
//! middleware, so a reverse proxy can delegate the decision to it.

use std::collections::HashSet;

use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::app::AppState;
use crate::authz::{resolve, ScopesEvaluator};
use crate::errors::{AppError, AppResult};
use crate::path::{ExpandClause, ODataPath};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorizeRequest {
    #[schema(example = "GET")]
    pub method: String,
    /// Resource path relative to the service root.
    #[schema(example = "Customers(1)/Orders")]
    pub path: String,
    /// Raw `$expand` option, if any.
    #[serde(default)]
    #[schema(example = "Items")]
    pub expand: Option<String>,
    #[serde(default)]
    #[schema(example = json!(["Orders.Read"]))]
    pub scopes: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthorizeResponse {
    pub allowed: bool,
    /// False when the path does not address an element of the model; such
    /// requests are not subject to capability restrictions.
    pub modeled: bool,
    /// Requirement rendered as text, e.g. `all[any[{Orders.Read}]]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub requirement_tree: Option<ScopesEvaluator>,
    /// Set when `$expand` could not be parsed and was ignored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expand_error: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/authorize",
    tag = "Authorization",
    request_body = AuthorizeRequest,
    responses(
        (status = 200, description = "Authorization decision", body = AuthorizeResponse),
        (status = 400, description = "Invalid HTTP method"),
    )
)]
pub async fn authorize(
    State(state): State<AppState>,
    Json(req): Json<AuthorizeRequest>,
) -> AppResult<Json<AuthorizeResponse>> {
    let method = Method::from_bytes(req.method.trim().to_uppercase().as_bytes())
        .map_err(|_| AppError::bad_request(format!("invalid HTTP method `{}`", req.method)))?;

    let path = match ODataPath::parse(&state.model, req.path.trim_start_matches('/')) {
        Ok(path) => path,
        Err(err) => {
            tracing::debug!(path = %req.path, error = %err, "path not modeled");
            return Ok(Json(AuthorizeResponse {
                allowed: true,
                modeled: false,
                requirement: None,
                requirement_tree: None,
                expand_error: None,
            }));
        }
    };

    let mut expand_error = None;
    let expand = match req.expand.as_deref().map(|text| ExpandClause::parse(&state.model, &path, text)) {
        Some(Ok(clause)) => Some(clause),
        Some(Err(err)) => {
            expand_error = Some(err.to_string());
            None
        }
        None => None,
    };

    let requirement = resolve(&state.model, &method, &path, expand.as_ref());
    let scopes: HashSet<String> = req.scopes.into_iter().collect();
    let allowed = requirement.allows_scopes(&scopes);

    tracing::debug!(%method, %path, allowed, requirement = %requirement, "authorize decision");

    Ok(Json(AuthorizeResponse {
        allowed,
        modeled: true,
        requirement: Some(requirement.to_string()),
        requirement_tree: Some(requirement),
        expand_error,
    }))
}

/// Reached only when the authorization middleware let the request through.
pub async fn forward_auth() -> StatusCode {
    StatusCode::NO_CONTENT
}
