//! Default translator conditions executed against SQLite.

#[path = "../common/mod.rs"]
mod common;

use avocado::query::QuerySet;
use avocado::sql::Dialect;
use avocado::translate::{TranslateContext, TranslateError, Translation};
use serde_json::{json, Value as Json};

use common::{ids, Hr};

fn translate(hr: &Hr, key: &str, operator: &str, value: Json) -> Result<Translation, TranslateError> {
    let field = hr.field(key);
    let cx = TranslateContext {
        tree: &hr.tree,
        operators: hr.catalog.operators(),
    };
    hr.translators
        .get(field.translator.as_deref())
        .translate(&field, Some(operator), &value, cx)
}

/// Root ids matching one condition.
fn matching(hr: &Hr, key: &str, operator: &str, value: Json) -> Vec<i64> {
    let translation = translate(hr, key, operator, value).unwrap();
    let qs = QuerySet::new(hr.tree.clone())
        .filter(translation.condition.unwrap())
        .distinct(true);
    let sql = qs.to_sql(Dialect::Sqlite).unwrap();
    ids(hr.executor().query(&sql, None).unwrap().fetch_all())
}

#[test]
fn test_range_on_related_field() {
    let hr = Hr::new();
    assert_eq!(
        matching(&hr, "hr.title.salary", "range", json!([50000, 100000])),
        vec![3, 4, 7]
    );
    // bounds are reordered
    assert_eq!(
        matching(&hr, "hr.title.salary", "range", json!([100000, 50000])),
        vec![3, 4, 7]
    );
}

#[test]
fn test_in_with_null_needs_the_related_row() {
    let hr = Hr::new();
    // Kim's title has no name; Bob has no title at all
    assert_eq!(
        matching(&hr, "hr.title.name", "in", json!(["CEO", null])),
        vec![1, 7]
    );
}

#[test]
fn test_isnull_on_related_field() {
    let hr = Hr::new();
    assert_eq!(matching(&hr, "hr.title.salary", "isnull", json!(true)), vec![5]);
    assert_eq!(matching(&hr, "hr.office.location", "exact", json!(null)), Vec::<i64>::new());
}

#[test]
fn test_negated_exact() {
    let hr = Hr::new();
    assert_eq!(
        matching(&hr, "hr.title.name", "-exact", json!("CEO")),
        vec![2, 3, 4, 5]
    );
}

#[test]
fn test_icontains_escapes_wildcards() {
    let hr = Hr::new();
    assert_eq!(matching(&hr, "hr.employee.first_name", "icontains", json!("ER")), vec![1, 2]);
    assert_eq!(
        matching(&hr, "hr.employee.first_name", "icontains", json!("%")),
        Vec::<i64>::new()
    );
}

#[test]
fn test_boolean_exact() {
    let hr = Hr::new();
    assert_eq!(matching(&hr, "hr.employee.is_manager", "exact", json!(true)), vec![1, 2]);
    assert_eq!(matching(&hr, "hr.employee.is_manager", "exact", json!("false")), vec![3, 4, 5, 6, 7]);
}

#[test]
fn test_many_to_many_lookup() {
    let hr = Hr::new();
    assert_eq!(matching(&hr, "hr.project.name", "exact", json!("Beta")), vec![3]);
    assert_eq!(matching(&hr, "hr.project.name", "in", json!(["Alpha", "Beta"])), vec![1, 3, 4]);
}

#[test]
fn test_quotes_in_values_are_escaped() {
    let hr = Hr::new();
    assert_eq!(
        matching(&hr, "hr.employee.last_name", "exact", json!("O'Brien")),
        Vec::<i64>::new()
    );
}

#[test]
fn test_rejected_inputs() {
    let hr = Hr::new();
    assert!(matches!(
        translate(&hr, "hr.title.salary", "gt", json!("lots")),
        Err(TranslateError::InvalidValue { .. })
    ));
    assert!(matches!(
        translate(&hr, "hr.employee.first_name", "isnull", json!(true)),
        Err(TranslateError::OperatorNotPermitted { .. })
    ));
    assert!(matches!(
        translate(&hr, "hr.title.name", "in", json!([])),
        Err(TranslateError::InvalidShape { .. })
    ));
}
