use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub entity_sets: usize,
    pub singletons: usize,
    pub operations: usize,
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, description = "Health check with a summary of the loaded model", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let model = &state.model;

    Json(HealthResponse {
        status: "ok",
        entity_sets: model.entity_sets.len(),
        singletons: model.singletons.len(),
        operations: model.operations.len() + model.operation_imports.len(),
    })
}
