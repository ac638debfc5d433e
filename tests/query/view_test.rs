//! View documents parsed against the catalog and executed.

#[path = "../common/mod.rs"]
mod common;

use avocado::catalog::StoredDocument;
use avocado::query::{ErrorKey, ParseError, SortDirection, ViewParser, WarningKey};
use avocado::sql::Dialect;
use avocado::value::Value;
use serde_json::json;

use common::{fetch, Hr};

fn names(rows: &[Vec<Value>]) -> Vec<String> {
    rows.iter().map(|row| row[1].to_string()).collect()
}

#[test]
fn test_projection_follows_facet_order() {
    let hr = Hr::new();
    let view = hr.view(json!([{"concept": "Office"}, {"concept": "Name"}]));
    assert!(view.is_valid());

    let sql = hr.processor().view(view).sql(Dialect::Sqlite, None, None).unwrap();
    let id = sql.find("\"employee\".\"id\"").unwrap();
    let location = sql.find("\"office\".\"location\"").unwrap();
    let first_name = sql.find("\"employee\".\"first_name\"").unwrap();
    let last_name = sql.find("\"employee\".\"last_name\"").unwrap();
    assert!(id < location && location < first_name && first_name < last_name);
}

#[test]
fn test_sort_index_orders_terms() {
    let hr = Hr::new();
    let view = hr.view(json!([
        {"concept": "First Name", "sort": "asc", "sort_index": 1},
        {"concept": "Office", "sort": "desc", "sort_index": 0}
    ]));
    let rows = fetch(&hr, &hr.processor().view(view));
    let office: Vec<String> = rows.iter().map(|row| row[2].to_string()).collect();
    // Denver first, NULL offices last
    assert_eq!(office, vec!["Denver", "Denver", "Denver", "Boston", "Boston", "Boston", ""]);
    assert_eq!(names(&rows), vec!["Kim", "Mel", "Zac", "Bob", "Eric", "Erin", "Ann"]);
}

#[test]
fn test_view_without_pk() {
    let hr = Hr::new();
    let view = hr.view(json!([{"concept": "First Name", "sort": "desc"}]));
    let rows = fetch(&hr, &hr.processor().view(view).include_pk(false));
    assert_eq!(rows.len(), 7);
    assert_eq!(rows[0], vec![Value::from("Zac")]);
}

#[test]
fn test_hidden_facets() {
    let hr = Hr::new();
    let view = hr.view(json!([
        {"concept": "First Name"},
        {"concept": "Salary", "visible": false, "sort": "desc"},
        {"concept": "Office", "visible": false}
    ]));
    assert!(view.has_hidden());
    let facets = view.facets();
    assert!(facets[1].is_projected());
    // hidden and unsorted: not projected at all
    assert!(!facets[2].is_projected());

    let rows = fetch(&hr, &hr.processor().view(view));
    assert_eq!(rows[0].len(), 3);
    assert_eq!(rows[0][1], Value::from("Eric"));
}

#[test]
fn test_facet_problems() {
    let hr = Hr::new();
    let mut hidden = hr.concept("Project");
    hidden.viewable = false;
    hr.catalog.save_concept(&mut hidden).unwrap();

    let mut fixed = hr.concept("Manager");
    fixed.sortable = false;
    hr.catalog.save_concept(&mut fixed).unwrap();

    let view = hr.view(json!([
        {"concept": 9999},
        {"concept": "Project"},
        {"concept": "Manager", "sort": "asc"},
        {"concept": "Office", "sort": "sideways"}
    ]));
    assert!(!view.is_valid());
    let facets = view.facets();
    assert_eq!(facets[0].errors, vec![ErrorKey::ConceptDoesNotExist]);
    assert_eq!(facets[1].errors, vec![ErrorKey::ConceptNotViewable]);
    assert_eq!(facets[2].warnings, vec![WarningKey::ConceptNotSortable]);
    assert_eq!(facets[2].sort, None);
    assert_eq!(facets[3].warnings, vec![WarningKey::InvalidSort]);

    let annotated = view.to_json();
    assert_eq!(annotated[0]["errors"], json!(["concept_does_not_exist"]));
    assert_eq!(annotated[0]["enabled"], json!(false));

    // broken facets drop out; the rest still runs
    let rows = fetch(&hr, &hr.processor().view(view));
    assert_eq!(rows[0].len(), 3);
}

#[test]
fn test_legacy_document() {
    let hr = Hr::new();
    let office = hr.concept("Office");
    let salary = hr.concept("Salary");
    let view = hr.view(json!({
        "columns": [office.id],
        "ordering": [[salary.id, "desc"], [office.id, "asc"]]
    }));
    let facets = view.facets();
    assert_eq!(facets.len(), 2);
    assert_eq!(facets[0].sort, Some(SortDirection::Asc));
    assert_eq!(facets[0].sort_index, Some(1));
    assert!(!facets[1].visible);
    assert_eq!(facets[1].sort, Some(SortDirection::Desc));
    assert_eq!(facets[1].sort_index, Some(0));
}

#[test]
fn test_stored_view_round_trip() {
    let hr = Hr::new();
    let mut stored = StoredDocument::new(json!([{"concept": "Title", "sort": "asc"}]));
    hr.catalog.save_view(&mut stored).unwrap();

    let loaded = hr.catalog.view(stored.id, None).unwrap();
    let view = hr.view(loaded.json);
    assert_eq!(view.to_json(), json!([{"concept": "Title", "sort": "asc"}]));
}

#[test]
fn test_user_sees_only_published_concepts() {
    let hr = Hr::new();
    let mut draft = hr.concept("Salary");
    draft.published = false;
    hr.catalog.save_concept(&mut draft).unwrap();

    let parser = ViewParser::new(&hr.catalog);
    let document = json!([{"concept": "Salary"}]);
    assert!(parser.parse(&document, None).unwrap().is_valid());
    let view = parser.parse(&document, Some("ann")).unwrap();
    assert_eq!(view.facets()[0].errors, vec![ErrorKey::ConceptDoesNotExist]);
}

#[test]
fn test_structural_errors() {
    let hr = Hr::new();
    let parser = ViewParser::new(&hr.catalog);
    assert!(matches!(parser.parse(&json!(3), None), Err(ParseError::Input(_))));
    assert!(matches!(
        parser.parse(&json!(["Office"]), None),
        Err(ParseError::Input(_))
    ));
}
