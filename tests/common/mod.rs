#![allow(dead_code)]

use std::path::PathBuf;

use axum::Router;

use odata_authz::authz::AuthzMode;
use odata_authz::config::{Config, ScopeSource};
use odata_authz::create_app;
use odata_authz::model::EdmModel;

pub fn sample_model_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/sample_model.json")
}

pub fn test_config() -> Config {
    Config {
        port: 8000,
        model_path: sample_model_path(),
        route_prefix: "/odata".to_string(),
        authz_mode: AuthzMode::Strict,
        scope_source: ScopeSource::Header("Permissions".to_string()),
    }
}

pub fn test_app() -> anyhow::Result<Router> {
    let config = test_config();
    let model = EdmModel::from_path(&config.model_path)?;
    Ok(create_app(model, &config))
}
