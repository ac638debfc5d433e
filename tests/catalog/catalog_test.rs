//! Catalog initialisation and derived data over a live database.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use avocado::cache::{Cache, SqliteCache};
use avocado::catalog::{
    Catalog, CatalogError, CatalogStore, Concept, Field, InitOptions, Permissions,
};
use avocado::config::CatalogSettings;
use avocado::schema::{InternalType, SimpleType};
use avocado::value::Value;

use common::Hr;

#[test]
fn test_init_registers_non_key_columns() {
    let hr = Hr::new();
    let mut keys: Vec<String> = hr
        .catalog
        .fields()
        .unwrap()
        .iter()
        .map(Field::natural_key_string)
        .collect();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "hr.employee.first_name",
            "hr.employee.is_manager",
            "hr.employee.last_name",
            "hr.office.location",
            "hr.project.name",
            "hr.title.name",
            "hr.title.salary",
        ]
    );

    let manager = hr.field("hr.employee.is_manager");
    assert_eq!(manager.simple_type, SimpleType::Boolean);
    assert!(manager.enumerable);
    assert!(hr.field("hr.office.location").enumerable);
    assert!(!hr.field("hr.title.salary").enumerable);
}

#[test]
fn test_init_with_keys_and_force() {
    let hr = Hr::new();
    let options = InitOptions {
        include_keys: true,
        force: true,
        ..Default::default()
    };
    let report = hr
        .catalog
        .init_from_schema(&hr.schema, Some(hr.engine.as_ref()), &options)
        .unwrap();
    assert!(report.created.contains(&"hr.employee.title_id".to_string()));
    assert_eq!(report.updated.len(), 7);

    let title_id = hr.field("hr.employee.title_id");
    assert_eq!(title_id.simple_type, SimpleType::Key);
    // created records stay unpublished unless asked
    assert!(!title_id.published);
}

#[test]
fn test_value_labels_and_codes() {
    let hr = Hr::new();
    let title = hr.field("hr.title.name");

    let labels = hr.catalog.value_labels(&title, hr.engine.as_ref()).unwrap();
    let shown: Vec<&str> = labels.iter().map(|l| l.label.as_str()).collect();
    assert_eq!(shown, vec!["No Data", "Analyst", "CEO", "CTO", "Programmer"]);

    let codes = hr.catalog.coded_values(&title, hr.engine.as_ref()).unwrap();
    assert_eq!(codes.len(), 4);
    assert_eq!(codes[0], (Value::from("Analyst"), 1));
    assert_eq!(codes[3], (Value::from("Programmer"), 4));

    let manager = hr.field("hr.employee.is_manager");
    let labels = hr.catalog.value_labels(&manager, hr.engine.as_ref()).unwrap();
    let shown: Vec<&str> = labels.iter().map(|l| l.label.as_str()).collect();
    assert_eq!(shown, vec!["No", "Yes"]);
}

#[test]
fn test_declared_choices_win() {
    let hr = Hr::new();
    let mut location = hr.field("hr.office.location");
    location.choices = Some(vec![Value::from("Denver"), Value::from("Austin")]);
    hr.catalog.save_field(&mut location).unwrap();

    let values = hr.catalog.distinct_values(&location, hr.engine.as_ref()).unwrap();
    assert_eq!(values, vec![Value::from("Denver"), Value::from("Austin")]);
}

#[test]
fn test_derived_values_are_cached_per_version() {
    let hr = Hr::new();
    let mut title = hr.field("hr.title.name");
    let before = hr.catalog.cache().stats().unwrap().entry_count;
    hr.catalog.distinct_values(&title, hr.engine.as_ref()).unwrap();
    assert_eq!(hr.catalog.cache().stats().unwrap().entry_count, before + 1);
    hr.catalog.distinct_values(&title, hr.engine.as_ref()).unwrap();
    assert_eq!(hr.catalog.cache().stats().unwrap().entry_count, before + 1);

    // saving evicts the record and everything derived from it
    title.description = Some("Job title".into());
    hr.catalog.save_field(&mut title).unwrap();
    let keys = hr
        .catalog
        .cache()
        .keys_with_prefix(&format!("avocado:field:{}:", title.id))
        .unwrap();
    assert!(keys.is_empty());
}

#[test]
fn test_orphaned_fields() {
    let hr = Hr::new();
    let mut ghost = Field::new(
        "hr",
        "employee",
        "employee",
        "shoe_size",
        InternalType::Integer,
        SimpleType::Number,
    );
    ghost.published = true;
    hr.catalog.save_field(&mut ghost).unwrap();

    let ghost = hr.field("hr.employee.shoe_size");
    assert!(ghost.orphaned);
    let published = hr.catalog.published_fields(None).unwrap();
    assert!(!published.iter().any(|f| f.column == "shoe_size"));
}

#[test]
fn test_unknown_references() {
    let hr = Hr::new();
    assert!(matches!(
        hr.catalog.resolve_field(&"hr.employee.age".into()),
        Err(CatalogError::FieldNotFound(_))
    ));
    assert!(matches!(
        hr.catalog.resolve_field(&"name".into()),
        Err(CatalogError::AmbiguousField { .. })
    ));
    assert!(matches!(
        hr.catalog.concept_named("Nobody"),
        Err(CatalogError::ConceptNotFound(_))
    ));
}

struct OnlyAnn;

impl Permissions for OnlyAnn {
    fn can_view_field(&self, user: Option<&str>, _field: &Field) -> bool {
        user == Some("ann")
    }

    fn can_view_concept(&self, user: Option<&str>, _concept: &Concept) -> bool {
        user == Some("ann")
    }
}

#[test]
fn test_permissions() {
    let hr = Hr::new();
    let settings = CatalogSettings {
        permissions_enabled: true,
        ..Default::default()
    };
    let catalog = Catalog::new(
        CatalogStore::open_in_memory().unwrap(),
        Cache::new(Arc::new(SqliteCache::open_in_memory().unwrap())),
        settings,
    )
    .with_permissions(Arc::new(OnlyAnn));
    let options = InitOptions {
        publish: true,
        concepts: true,
        ..Default::default()
    };
    catalog
        .init_from_schema(&hr.schema, Some(hr.engine.as_ref()), &options)
        .unwrap();

    assert_eq!(catalog.published_fields(Some("ann")).unwrap().len(), 7);
    assert!(catalog.published_fields(Some("bob")).unwrap().is_empty());
    assert_eq!(catalog.published_concepts(Some("ann")).unwrap().len(), 7);
}
