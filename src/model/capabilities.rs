//! Capability vocabulary terms and the restriction kinds derived from them.

pub const CAPABILITIES_NAMESPACE: &str = "Org.OData.Capabilities.V1";

pub const READ_RESTRICTIONS: &str = "Org.OData.Capabilities.V1.ReadRestrictions";
pub const INSERT_RESTRICTIONS: &str = "Org.OData.Capabilities.V1.InsertRestrictions";
pub const UPDATE_RESTRICTIONS: &str = "Org.OData.Capabilities.V1.UpdateRestrictions";
pub const DELETE_RESTRICTIONS: &str = "Org.OData.Capabilities.V1.DeleteRestrictions";
pub const OPERATION_RESTRICTIONS: &str = "Org.OData.Capabilities.V1.OperationRestrictions";
pub const NAVIGATION_RESTRICTIONS: &str = "Org.OData.Capabilities.V1.NavigationRestrictions";

/// Record property names used inside restriction records.
pub mod fields {
    pub const PERMISSIONS: &str = "Permissions";
    pub const SCHEME_NAME: &str = "SchemeName";
    pub const SCOPES: &str = "Scopes";
    pub const SCOPE: &str = "Scope";
    pub const RESTRICTED_PROPERTIES: &str = "RestrictedProperties";
    pub const NAVIGATION_PROPERTY: &str = "NavigationProperty";
    pub const READ_BY_KEY_RESTRICTIONS: &str = "ReadByKeyRestrictions";
    pub const READ_RESTRICTIONS: &str = "ReadRestrictions";
    pub const INSERT_RESTRICTIONS: &str = "InsertRestrictions";
    pub const UPDATE_RESTRICTIONS: &str = "UpdateRestrictions";
    pub const DELETE_RESTRICTIONS: &str = "DeleteRestrictions";
}

/// Category of operation a restriction annotation governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestrictionKind {
    Read,
    /// Layered under [`RestrictionKind::Read`]: lives in the nested
    /// `ReadByKeyRestrictions` record of the read annotation.
    ReadByKey,
    Insert,
    Update,
    Delete,
    Operation,
    Navigation,
}

impl RestrictionKind {
    /// The annotation term that carries this kind.
    pub fn term(self) -> &'static str {
        match self {
            RestrictionKind::Read | RestrictionKind::ReadByKey => READ_RESTRICTIONS,
            RestrictionKind::Insert => INSERT_RESTRICTIONS,
            RestrictionKind::Update => UPDATE_RESTRICTIONS,
            RestrictionKind::Delete => DELETE_RESTRICTIONS,
            RestrictionKind::Operation => OPERATION_RESTRICTIONS,
            RestrictionKind::Navigation => NAVIGATION_RESTRICTIONS,
        }
    }

    /// The record property holding this kind inside a navigation
    /// `RestrictedProperties` entry, for the kinds an override can carry.
    pub fn navigation_field(self) -> Option<&'static str> {
        match self {
            RestrictionKind::Read | RestrictionKind::ReadByKey => Some(fields::READ_RESTRICTIONS),
            RestrictionKind::Insert => Some(fields::INSERT_RESTRICTIONS),
            RestrictionKind::Update => Some(fields::UPDATE_RESTRICTIONS),
            RestrictionKind::Delete => Some(fields::DELETE_RESTRICTIONS),
            RestrictionKind::Operation | RestrictionKind::Navigation => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_by_key_shares_the_read_term() {
        assert_eq!(RestrictionKind::ReadByKey.term(), RestrictionKind::Read.term());
        assert!(READ_RESTRICTIONS.starts_with(CAPABILITIES_NAMESPACE));
    }

    #[test]
    fn operation_kinds_have_no_navigation_field() {
        assert_eq!(RestrictionKind::Operation.navigation_field(), None);
        assert_eq!(RestrictionKind::Update.navigation_field(), Some("UpdateRestrictions"));
    }
}
