//! Authorization: capability restrictions to scope requirements
//!
//! - `evaluator`: boolean expression over declared permission entries
//! - `extractor`: reads capability restriction annotations
//! - `resolver`: walks a typed request path and builds the requirement
//! - `gate`: axum middleware enforcing the requirement (off/advisory/strict)

mod evaluator;
pub mod extractor;
mod gate;
mod principal;
mod resolver;

pub use evaluator::{Permission, PermissionScope, ScopesEvaluator};
pub use gate::{expand_options, require_odata_authorization, ODataAuthorization};
pub use principal::{ClaimScopeFinder, HeaderScopeFinder, Principal, ScopeFinder, ScopeFinderContext};
pub use resolver::{resolve, Access};

use std::fmt;
use std::str::FromStr;

/// Authorization enforcement mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthzMode {
    /// No permission checks (development mode)
    Off,
    /// Log denials but allow requests (testing mode)
    Advisory,
    /// Reject denied requests with 401/403 (production mode)
    #[default]
    Strict,
}

impl FromStr for AuthzMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "off" => Ok(AuthzMode::Off),
            "advisory" => Ok(AuthzMode::Advisory),
            "strict" => Ok(AuthzMode::Strict),
            other => Err(format!("unknown authorization mode `{other}` (expected off, advisory or strict)")),
        }
    }
}

impl fmt::Display for AuthzMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthzMode::Off => "off",
            AuthzMode::Advisory => "advisory",
            AuthzMode::Strict => "strict",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes_case_insensitively() {
        assert_eq!("Advisory".parse::<AuthzMode>(), Ok(AuthzMode::Advisory));
        assert_eq!(" off ".parse::<AuthzMode>(), Ok(AuthzMode::Off));
        assert!("enforce".parse::<AuthzMode>().is_err());
        assert_eq!(AuthzMode::default(), AuthzMode::Strict);
    }
}
