//! Context documents parsed against the catalog and executed.

#[path = "../common/mod.rs"]
mod common;

use avocado::catalog::StoredDocument;
use avocado::query::{ContextParser, ErrorKey, ParseError, WarningKey};
use serde_json::json;

use common::{fetch, ids, Hr};

#[test]
fn test_nested_branches() {
    let hr = Hr::new();
    let context = hr.context(json!({
        "type": "and",
        "children": [
            {"field": "hr.employee.is_manager", "operator": "exact", "value": false},
            {
                "type": "or",
                "children": [
                    {"field": "hr.office.location", "operator": "exact", "value": "Denver"},
                    {"field": "hr.title.name", "operator": "exact", "value": "Analyst"}
                ]
            }
        ]
    }));
    assert!(context.is_valid());

    let processor = hr.processor().context(context);
    assert_eq!(ids(fetch(&hr, &processor)), vec![3, 4, 5, 7]);
}

#[test]
fn test_partial_natural_keys_resolve() {
    let hr = Hr::new();
    let context = hr.context(json!({"field": "location", "value": "Boston"}));
    assert!(context.is_valid());
    assert_eq!(ids(fetch(&hr, &hr.processor().context(context))), vec![1, 2, 6]);

    // "name" exists on both title and project
    let context = hr.context(json!({"field": "name", "value": "CEO"}));
    assert_eq!(context.root().errors, vec![ErrorKey::AmbiguousField]);
}

#[test]
fn test_invalid_child_is_skipped() {
    let hr = Hr::new();
    let context = hr.context(json!({
        "type": "and",
        "children": [
            {"field": "hr.employee.age", "operator": "gt", "value": 40},
            {"field": "hr.office.location", "value": "Boston"}
        ]
    }));
    assert!(!context.is_valid());

    let annotated = context.to_json();
    assert_eq!(annotated["children"][0]["errors"], json!(["field_does_not_exist"]));
    assert_eq!(annotated["children"][0]["enabled"], json!(false));
    assert!(annotated["children"][1].get("errors").is_none());

    assert_eq!(ids(fetch(&hr, &hr.processor().context(context))), vec![1, 2, 6]);
}

#[test]
fn test_bad_values_disable_the_condition() {
    let hr = Hr::new();
    let context = hr.context(json!({"field": "hr.title.salary", "operator": "gt", "value": "lots"}));
    assert_eq!(context.root().errors, vec![ErrorKey::InvalidValueType]);
    assert!(context.condition().is_none());

    let context = hr.context(json!({"field": "hr.title.salary", "operator": "near", "value": 1}));
    assert_eq!(context.root().errors, vec![ErrorKey::InvalidOperator]);
}

#[test]
fn test_null_for_required_field_warns() {
    let hr = Hr::new();
    let context = hr.context(json!({
        "field": "hr.employee.first_name", "operator": "in", "value": ["Eric", null]
    }));
    assert_eq!(context.root().warnings, vec![WarningKey::FieldNotNullable]);
}

#[test]
fn test_concept_restricts_field() {
    let hr = Hr::new();
    let salary = hr.concept("Salary");
    let context = hr.context(json!({
        "concept": salary.id, "field": "hr.title.salary", "operator": "gte", "value": 200000
    }));
    assert!(context.is_valid());
    assert_eq!(ids(fetch(&hr, &hr.processor().context(context))), vec![1, 2]);

    let context = hr.context(json!({
        "concept": salary.id, "field": "hr.title.name", "value": "CEO"
    }));
    assert_eq!(context.root().errors, vec![ErrorKey::FieldDoesNotExist]);
}

#[test]
fn test_user_sees_only_published_fields() {
    let hr = Hr::new();
    let mut last_name = hr.field("hr.employee.last_name");
    last_name.published = false;
    hr.catalog.save_field(&mut last_name).unwrap();

    let document = json!({"field": "hr.employee.last_name", "value": "Lee"});
    let parser = ContextParser::new(&hr.catalog, &hr.translators, &hr.tree);
    let anonymous = parser.parse(&document, None).unwrap();
    assert!(anonymous.is_valid());
    let user = parser.parse(&document, Some("ann")).unwrap();
    assert_eq!(user.root().errors, vec![ErrorKey::FieldDoesNotExist]);
}

#[test]
fn test_composite_expands_stored_context() {
    let hr = Hr::new();
    let mut stored = StoredDocument::new(json!({
        "field": "hr.office.location", "operator": "exact", "value": "Denver"
    }));
    hr.catalog.save_context(&mut stored).unwrap();

    let context = hr.context(json!({
        "type": "and",
        "children": [
            {"composite": stored.id},
            {"field": "hr.title.name", "operator": "exact", "value": "Programmer"}
        ]
    }));
    assert_eq!(ids(fetch(&hr, &hr.processor().context(context))), vec![3, 4]);

    // older spelling
    let context = hr.context(json!({"composite": true, "id": stored.id}));
    assert_eq!(ids(fetch(&hr, &hr.processor().context(context))), vec![3, 4, 7]);
}

#[test]
fn test_disabled_nodes_do_not_filter() {
    let hr = Hr::new();
    let mut stored = StoredDocument::new(json!({
        "field": "hr.office.location", "operator": "exact", "value": "Denver"
    }));
    hr.catalog.save_context(&mut stored).unwrap();

    let context = hr.context(json!({
        "type": "and",
        "children": [
            {"field": "hr.employee.is_manager", "operator": "exact", "value": false},
            {
                "type": "or",
                "enabled": false,
                "children": [
                    {"field": "hr.title.name", "operator": "exact", "value": "CEO"},
                    {"field": "hr.title.name", "operator": "exact", "value": "CTO"}
                ]
            },
            {"composite": stored.id, "enabled": false}
        ]
    }));
    assert!(context.is_valid());
    assert_eq!(ids(fetch(&hr, &hr.processor().context(context))), vec![3, 4, 5, 6, 7]);

    let context = hr.context(json!({
        "type": "and",
        "enabled": false,
        "children": [
            {"field": "hr.employee.is_manager", "operator": "exact", "value": true},
            {"composite": stored.id}
        ]
    }));
    assert!(context.condition().is_none());
    assert_eq!(context.to_json()["enabled"], json!(false));
    assert_eq!(ids(fetch(&hr, &hr.processor().context(context))), vec![1, 2, 3, 4, 5, 6, 7]);
}

#[test]
fn test_composite_cycle_fails_the_parse() {
    let hr = Hr::new();
    let mut stored = StoredDocument::new(json!({}));
    hr.catalog.save_context(&mut stored).unwrap();
    stored.json = json!({"composite": stored.id});
    hr.catalog.save_context(&mut stored).unwrap();

    let parser = ContextParser::new(&hr.catalog, &hr.translators, &hr.tree);
    let err = parser.parse(&json!({"composite": stored.id}), None).unwrap_err();
    assert!(matches!(err, ParseError::CompositeCycle(id) if id == stored.id));
}

#[test]
fn test_language_follows_the_tree() {
    let hr = Hr::new();
    let context = hr.context(json!({
        "type": "or",
        "children": [
            {"field": "hr.title.salary", "operator": "gt", "value": 150000},
            {"field": "hr.office.location", "operator": "exact", "value": "Denver"}
        ]
    }));
    let language = context.language();
    assert_eq!(language["type"], json!("or"));
    assert_eq!(language["children"].as_array().unwrap().len(), 2);
    assert_eq!(
        language["children"][0],
        json!("Salary is greater than 150000")
    );
}

#[test]
fn test_structural_errors() {
    let hr = Hr::new();
    let parser = ContextParser::new(&hr.catalog, &hr.translators, &hr.tree);
    assert!(matches!(
        parser.parse(&json!([1, 2]), None),
        Err(ParseError::Input(_))
    ));
    assert!(matches!(
        parser.parse(&json!({"type": "and", "children": 3}), None),
        Err(ParseError::Input(_))
    ));
}
