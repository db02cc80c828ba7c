use std::collections::HashSet;

use anyhow::Result;
use axum::http::Method;
use serde_json::{json, Value};

use odata_authz::authz::resolve;
use odata_authz::model::EdmModel;
use odata_authz::path::{ExpandClause, ODataPath};

const READ: &str = "Org.OData.Capabilities.V1.ReadRestrictions";
const INSERT: &str = "Org.OData.Capabilities.V1.InsertRestrictions";
const NAVIGATION: &str = "Org.OData.Capabilities.V1.NavigationRestrictions";

fn permissions(scopes: &[&str]) -> Value {
    json!({"Permissions": [{
        "SchemeName": "Bearer",
        "Scopes": scopes.iter().map(|s| json!({"Scope": s})).collect::<Vec<_>>()
    }]})
}

fn model(customers: Value, orders: Value) -> Result<EdmModel> {
    let doc = json!({
        "namespace": "Shop",
        "entity_types": {
            "Customer": {
                "key": ["Id"],
                "properties": {"Id": "Edm.Int32", "Name": "Edm.String"},
                "navigation_properties": {"Orders": {"target": "Order", "collection": true}}
            },
            "Order": {"key": ["Id"], "properties": {"Id": "Edm.Int32"}}
        },
        "entity_sets": {
            "Customers": {
                "entity_type": "Customer",
                "navigation_bindings": {"Orders": "Orders"},
                "annotations": customers
            },
            "Orders": {"entity_type": "Order", "annotations": orders}
        }
    });
    Ok(EdmModel::from_json_str(&doc.to_string())?)
}

fn scopes(values: &[&str]) -> HashSet<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn decide(model: &EdmModel, method: Method, path: &str, expand: Option<&str>, granted: &[&str]) -> Result<bool> {
    let path = ODataPath::parse(model, path)?;
    let expand = expand.map(|text| ExpandClause::parse(model, &path, text)).transpose()?;
    Ok(resolve(model, &method, &path, expand.as_ref()).allows_scopes(&scopes(granted)))
}

#[test]
fn unannotated_models_are_unrestricted() -> Result<()> {
    let model = model(json!({}), json!({}))?;
    let methods = [Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE];
    let paths = [
        "Customers",
        "Customers(1)",
        "Customers(1)/Name",
        "Customers(1)/Orders",
        "Customers(1)/Orders(5)",
        "Customers(1)/Orders/$ref",
        "Customers/$count",
    ];

    for method in methods {
        for path in paths {
            assert!(decide(&model, method.clone(), path, None, &[])?, "{method} {path}");
        }
    }
    assert!(decide(&model, Method::GET, "Customers", Some("Orders($expand=*)"), &[])?);
    Ok(())
}

#[test]
fn read_requires_an_intersecting_scope() -> Result<()> {
    let model = model(json!({ READ: permissions(&["A", "B"]) }), json!({}))?;

    assert!(decide(&model, Method::GET, "Customers", None, &["A"])?);
    assert!(decide(&model, Method::GET, "Customers", None, &["B", "Z"])?);
    assert!(!decide(&model, Method::GET, "Customers", None, &["C"])?);
    assert!(!decide(&model, Method::GET, "Customers", None, &[])?);
    Ok(())
}

#[test]
fn methods_map_to_their_restriction_kind() -> Result<()> {
    let model = model(json!({ INSERT: permissions(&["X"]) }), json!({}))?;

    assert!(!decide(&model, Method::POST, "Customers", None, &[])?);
    assert!(decide(&model, Method::POST, "Customers", None, &["X"])?);
    assert!(decide(&model, Method::GET, "Customers", None, &[])?);
    assert!(decide(&model, Method::PUT, "Customers(1)", None, &[])?);
    assert!(decide(&model, Method::DELETE, "Customers(1)", None, &[])?);
    Ok(())
}

#[test]
fn navigation_override_adds_to_the_parent_key_requirement() -> Result<()> {
    let model = model(
        json!({
            READ: permissions(&["A"]),
            NAVIGATION: {"RestrictedProperties": [
                {"NavigationProperty": "Orders", "ReadRestrictions": permissions(&["B"])}
            ]}
        }),
        json!({}),
    )?;

    assert!(!decide(&model, Method::GET, "Customers(1)/Orders", None, &["A"])?);
    // The key segment still needs the collection's Read scopes.
    assert!(!decide(&model, Method::GET, "Customers(1)/Orders", None, &["B"])?);
    assert!(decide(&model, Method::GET, "Customers(1)/Orders", None, &["A", "B"])?);
    assert!(decide(&model, Method::GET, "Customers", None, &["A"])?);
    assert!(!decide(&model, Method::GET, "Customers", None, &["B"])?);
    Ok(())
}

#[test]
fn item_access_through_navigation_needs_both_requirements() -> Result<()> {
    let model = model(
        json!({
            READ: {"ReadByKeyRestrictions": permissions(&["A"])},
            NAVIGATION: {"RestrictedProperties": [
                {"NavigationProperty": "Customers/Orders", "ReadRestrictions": permissions(&["B"])}
            ]}
        }),
        json!({}),
    )?;

    assert!(!decide(&model, Method::GET, "Customers(1)/Orders(5)", None, &["A"])?);
    assert!(!decide(&model, Method::GET, "Customers(1)/Orders(5)", None, &["B"])?);
    assert!(decide(&model, Method::GET, "Customers(1)/Orders(5)", None, &["A", "B"])?);
    Ok(())
}

#[test]
fn expansion_adds_a_requirement() -> Result<()> {
    let model = model(
        json!({
            NAVIGATION: {"RestrictedProperties": [
                {"NavigationProperty": "Orders", "ReadRestrictions": permissions(&["C"])}
            ]}
        }),
        json!({}),
    )?;

    assert!(decide(&model, Method::GET, "Customers", None, &[])?);
    assert!(!decide(&model, Method::GET, "Customers", Some("Orders"), &[])?);
    assert!(decide(&model, Method::GET, "Customers", Some("Orders"), &["C"])?);
    assert!(decide(&model, Method::GET, "Customers(1)", Some("Orders"), &["C"])?);
    Ok(())
}

#[test]
fn resolution_is_deterministic() -> Result<()> {
    let model = model(
        json!({ READ: permissions(&["A"]), INSERT: permissions(&["X"]) }),
        json!({ READ: permissions(&["O"]) }),
    )?;
    let path = ODataPath::parse(&model, "Customers(1)/Orders")?;

    let first = resolve(&model, &Method::GET, &path, None);
    let second = resolve(&model, &Method::GET, &path, None);
    assert_eq!(first, second);

    let cases: [&[&str]; 5] = [&[], &["A"], &["O"], &["A", "O"], &["X"]];
    for granted in cases {
        let granted = scopes(granted);
        assert_eq!(first.allows_scopes(&granted), second.allows_scopes(&granted));
    }
    Ok(())
}

#[test]
fn malformed_annotations_fail_open() -> Result<()> {
    let model = model(
        json!({
            READ: {"Permissions": "everyone"},
            INSERT: [1, 2, 3],
            NAVIGATION: {"RestrictedProperties": {"NavigationProperty": "Orders"}}
        }),
        json!({ READ: {"Permissions": [{"SchemeName": "Bearer"}]} }),
    )?;

    assert!(decide(&model, Method::GET, "Customers", None, &[])?);
    assert!(decide(&model, Method::POST, "Customers", None, &[])?);
    assert!(decide(&model, Method::GET, "Customers(1)/Orders", None, &[])?);
    Ok(())
}
