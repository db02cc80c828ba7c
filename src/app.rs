use std::sync::Arc;

use axum::http::Method;
use axum::middleware::from_fn_with_state;
use axum::routing::{any, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{require_odata_authorization, ODataAuthorization};
use crate::config::Config;
use crate::model::EdmModel;
use crate::routes::{authorize, health};

#[derive(Clone)]
pub struct AppState {
    pub model: Arc<EdmModel>,
}

impl AppState {
    pub fn new(model: EdmModel) -> Self {
        Self { model: Arc::new(model) }
    }
}

pub fn create_app(model: EdmModel, config: &Config) -> Router {
    let state = AppState::new(model);

    let authz = ODataAuthorization::new(Arc::clone(&state.model), config.scope_source.finder())
        .with_route_prefix(config.route_prefix.clone())
        .with_mode(config.authz_mode);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(health::health))
        .route("/authorize", post(authorize::authorize));

    // Forward-auth surface: the middleware decides, the handler only confirms.
    let prefix = config.route_prefix.trim_end_matches('/');
    let odata_routes = Router::new().route(&format!("{prefix}/*resource"), any(authorize::forward_auth));

    Router::new()
        .nest("/api", api_routes)
        .merge(odata_routes)
        .with_state(state)
        .layer(from_fn_with_state(authz, require_odata_authorization))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
