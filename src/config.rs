use std::path::PathBuf;
use std::sync::Arc;

use crate::authz::{AuthzMode, ClaimScopeFinder, HeaderScopeFinder, ScopeFinder};
use crate::errors::AppError;

/// Where the gate reads the caller's scopes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeSource {
    /// Claims of the given type on the authenticated principal.
    Claim(String),
    /// A comma-separated request header (development only).
    Header(String),
}

impl ScopeSource {
    pub fn finder(&self) -> Arc<dyn ScopeFinder> {
        match self {
            ScopeSource::Claim(claim_type) => Arc::new(ClaimScopeFinder::new(claim_type.clone())),
            ScopeSource::Header(header) => Arc::new(HeaderScopeFinder::new(header.clone())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub model_path: PathBuf,
    pub route_prefix: String,
    pub authz_mode: AuthzMode,
    pub scope_source: ScopeSource,
}

impl Config {
    pub const DEFAULT_PORT: u16 = 8000;
    pub const DEFAULT_MODEL_PATH: &'static str = "data/sample_model.json";
    pub const DEFAULT_ROUTE_PREFIX: &'static str = "/odata";

    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` uses the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let port = match lookup("APP_PORT") {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| AppError::configuration("APP_PORT must be a valid port number"))?,
            None => Self::DEFAULT_PORT,
        };

        let model_path = lookup("ODATA_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_MODEL_PATH));

        let route_prefix = lookup("ODATA_ROUTE_PREFIX").unwrap_or_else(|| Self::DEFAULT_ROUTE_PREFIX.to_string());
        if !route_prefix.is_empty() && !route_prefix.starts_with('/') {
            return Err(AppError::configuration("ODATA_ROUTE_PREFIX must start with '/'"));
        }

        let authz_mode = match lookup("AUTHZ_MODE") {
            Some(value) => value.parse::<AuthzMode>().map_err(AppError::configuration)?,
            None => AuthzMode::default(),
        };

        let scope_source = match lookup("SCOPE_SOURCE").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("claim") => ScopeSource::Claim(
                lookup("SCOPE_CLAIM_TYPE").unwrap_or_else(|| ClaimScopeFinder::DEFAULT_CLAIM_TYPE.to_string()),
            ),
            Some("header") => ScopeSource::Header(
                lookup("SCOPE_HEADER").unwrap_or_else(|| HeaderScopeFinder::DEFAULT_HEADER.to_string()),
            ),
            Some(other) => {
                return Err(AppError::configuration(format!(
                    "SCOPE_SOURCE must be `claim` or `header`, got `{other}`"
                )))
            }
        };

        Ok(Self {
            port,
            model_path,
            route_prefix,
            authz_mode,
            scope_source,
        })
    }
}
