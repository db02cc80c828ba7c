//! Reads capability restriction annotations into permission entries.
//!
//! Annotation values are untyped JSON. Anything that does not have the
//! expected shape is skipped: a malformed declaration behaves exactly like an
//! absent one and never turns into a denial.

use serde_json::{Map, Value};

use super::evaluator::{Permission, PermissionScope};
use crate::model::capabilities::{fields, NAVIGATION_RESTRICTIONS, READ_RESTRICTIONS};
use crate::model::{Annotations, RestrictionKind};

/// Permission entries declared on an element for `kind`.
///
/// `ReadByKey` is the read permissions plus those of the nested
/// `ReadByKeyRestrictions` record.
pub fn permissions(annotations: &Annotations, kind: RestrictionKind) -> Vec<Permission> {
    match kind {
        RestrictionKind::ReadByKey => read_by_key_permissions(annotations),
        RestrictionKind::Navigation => Vec::new(),
        _ => annotations
            .get(kind.term())
            .map(permissions_from_record)
            .unwrap_or_default(),
    }
}

fn read_by_key_permissions(annotations: &Annotations) -> Vec<Permission> {
    let Some(record) = annotations.get(READ_RESTRICTIONS).filter(|value| value.is_object()) else {
        return Vec::new();
    };

    let mut permissions = permissions_from_record(record);
    if let Some(by_key) = record.get(fields::READ_BY_KEY_RESTRICTIONS) {
        permissions.extend(permissions_from_record(by_key));
    }
    permissions
}

/// Entries of the `Permissions` collection of a restriction record.
pub fn permissions_from_record(record: &Value) -> Vec<Permission> {
    record
        .get(fields::PERMISSIONS)
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(Value::as_object).filter_map(permission_entry).collect())
        .unwrap_or_default()
}

fn permission_entry(entry: &Map<String, Value>) -> Option<Permission> {
    let scheme_name = entry.get(fields::SCHEME_NAME)?.as_str()?;
    let scopes = entry.get(fields::SCOPES)?.as_array()?;

    let scopes = scopes
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|record| {
            let scope = record.get(fields::SCOPE)?.as_str()?;
            Some(PermissionScope {
                scope: scope.to_string(),
                restricted_properties: record
                    .get(fields::RESTRICTED_PROPERTIES)
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        })
        .collect();

    Some(Permission {
        scheme_name: scheme_name.to_string(),
        scopes,
    })
}

/// `RestrictedProperties` records of the element's navigation restrictions.
fn restricted_properties(annotations: &Annotations) -> impl Iterator<Item = &Map<String, Value>> {
    annotations
        .get(NAVIGATION_RESTRICTIONS)
        .and_then(|record| record.get(fields::RESTRICTED_PROPERTIES))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

/// Text of a `NavigationProperty` value, either a plain string or a
/// `{"$NavigationPropertyPath": ...}` record.
fn declared_path(value: &Value) -> Option<&str> {
    value
        .as_str()
        .or_else(|| value.get("$NavigationPropertyPath").and_then(Value::as_str))
}

/// Does a declared navigation path name `path`?
///
/// Declared paths are `/` or `.` separated, and may either start at the root
/// navigation source (`Customers/Orders`) or below it (`Orders`).
pub fn navigation_path_matches(declared: &str, path: &[&str]) -> bool {
    let declared: Vec<&str> = declared
        .split(['/', '.'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    if declared.is_empty() {
        return false;
    }
    declared == path || (path.len() > 1 && declared == path[1..])
}

/// Override permissions for navigating `path` from the root element that owns
/// `annotations`.
///
/// The first restricted property whose path matches and that declares a
/// record for `kind` wins. `None` means no override applies. For reads of a
/// keyed target, the nested `ReadByKeyRestrictions` entries are added to the
/// read entries.
pub fn navigation_override(
    annotations: &Annotations,
    path: &[&str],
    kind: RestrictionKind,
    by_key: bool,
) -> Option<Vec<Permission>> {
    let field = kind.navigation_field()?;

    for restricted in restricted_properties(annotations) {
        let matches = restricted
            .get(fields::NAVIGATION_PROPERTY)
            .and_then(declared_path)
            .is_some_and(|declared| navigation_path_matches(declared, path));
        if !matches {
            continue;
        }

        let Some(record) = restricted.get(field).filter(|value| value.is_object()) else {
            continue;
        };

        let mut permissions = permissions_from_record(record);
        let is_read = matches!(kind, RestrictionKind::Read | RestrictionKind::ReadByKey);
        if is_read && by_key {
            if let Some(by_key_record) = record.get(fields::READ_BY_KEY_RESTRICTIONS) {
                permissions.extend(permissions_from_record(by_key_record));
            }
        }
        return Some(permissions);
    }

    None
}
