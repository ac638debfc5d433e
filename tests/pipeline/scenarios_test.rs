//! Requests run end to end: documents in, formatted pages out.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use avocado::config::ExportSettings;
use avocado::export::{Codes, JsonExporter, ReadMode};
use avocado::format::FormatterRegistry;
use avocado::query::{QueryProcessor, ResultPage, ResultRequest};
use avocado::sql::Dialect;
use avocado::value::Value;
use serde_json::json;

use common::{fetch, ids, Hr};

fn page(hr: &Hr, processor: &QueryProcessor, request: ResultRequest) -> ResultPage {
    request
        .execute(
            processor,
            &hr.executor(),
            Arc::new(JsonExporter),
            &FormatterRegistry::new(),
            &Codes::new(),
            &ExportSettings::default(),
        )
        .unwrap()
}

fn column(page: &ResultPage) -> Vec<Value> {
    page.rows.iter().map(|row| row[0].1.clone()).collect()
}

#[test]
fn test_managers_by_first_name() {
    let hr = Hr::new();
    let processor = hr
        .processor()
        .context(hr.context(json!({
            "field": "hr.employee.is_manager", "operator": "exact", "value": true
        })))
        .view(hr.view(json!([{"concept": "First Name", "sort": "asc"}])))
        .include_pk(false);

    let rows = fetch(&hr, &processor);
    assert_eq!(rows, vec![vec![Value::from("Eric")], vec![Value::from("Erin")]]);
}

#[test]
fn test_salary_range_through_a_join() {
    let hr = Hr::new();
    let processor = hr
        .processor()
        .context(hr.context(json!({
            "field": "hr.title.salary", "operator": "range", "value": [50000, 100000]
        })))
        .view(hr.view(json!([{"concept": "First Name", "sort": "asc"}])));

    let sql = processor.sql(Dialect::Sqlite, None, None).unwrap();
    assert!(sql.contains("\"title\".\"salary\" BETWEEN 50000 AND 100000"));
    assert!(sql.contains("\"employee\".\"id\" IS NOT NULL"));

    let page = page(&hr, &processor, ResultRequest::new(1, 20));
    assert_eq!(page.keys, vec!["id", "first_name"]);
    assert_eq!(
        page.to_json()["items"],
        json!([[7, "Kim"], [4, "Mel"], [3, "Zac"]])
    );
}

#[test]
fn test_in_list_with_null() {
    let hr = Hr::new();
    let processor = hr.processor().context(hr.context(json!({
        "field": "hr.title.name", "operator": "in", "value": ["CEO", null]
    })));
    // Bob has no title row, so the null branch does not reach him
    assert_eq!(ids(fetch(&hr, &processor)), vec![1, 7]);
}

#[test]
fn test_or_across_joins_keeps_rows_once() {
    let hr = Hr::new();
    let processor = hr
        .processor()
        .context(hr.context(json!({
            "type": "or",
            "children": [
                {"field": "hr.title.salary", "operator": "gt", "value": 150000},
                {"field": "hr.office.location", "operator": "exact", "value": "Denver"}
            ]
        })))
        .view(hr.view(json!([{"concept": "Project"}])));

    let sql = processor.sql(Dialect::Sqlite, None, None).unwrap();
    assert!(sql.starts_with("SELECT DISTINCT"));
    assert!(sql.contains("LEFT OUTER JOIN \"title\""));
    assert!(sql.contains("LEFT OUTER JOIN \"office\""));

    // Zac is on two projects, so he appears once per project
    let rows = fetch(&hr, &processor);
    assert_eq!(rows.len(), 6);
    let mut unique = ids(rows);
    unique.dedup();
    assert_eq!(unique, vec![1, 2, 3, 4, 7]);
}

#[test]
fn test_hidden_sort_column_does_not_duplicate_rows() {
    let hr = Hr::new();
    let processor = hr
        .processor()
        .view(hr.view(json!([
            {"concept": "Office"},
            {"concept": "Salary", "visible": false, "sort": "desc"}
        ])))
        .include_pk(false);
    assert!(processor.has_hidden());

    let sql = processor.sql(Dialect::Sqlite, None, None).unwrap();
    assert!(sql.contains("\"title\".\"salary\""));

    let request = ResultRequest::new(1, 20).reader(ReadMode::Threaded);
    assert_eq!(request.read_mode(&processor), ReadMode::Manual);
    let first = page(&hr, &processor, request);
    assert_eq!(first.keys, vec!["location"]);
    assert_eq!(
        column(&first),
        vec![Value::from("Boston"), Value::from("Denver"), Value::Null]
    );

    // pages are cut after duplicates are dropped
    let second = page(&hr, &processor, ResultRequest::new(2, 1));
    assert_eq!(column(&second), vec![Value::from("Denver")]);
    let tail = page(&hr, &processor, ResultRequest::new(2, 1).stop_page(5));
    assert_eq!(column(&tail), vec![Value::from("Denver"), Value::Null]);
}

#[test]
fn test_pages_slice_in_the_database() {
    let hr = Hr::new();
    let processor = hr
        .processor()
        .view(hr.view(json!([{"concept": "First Name", "sort": "asc"}])));

    let sql = processor.sql(Dialect::Sqlite, Some(2), Some(2)).unwrap();
    assert!(sql.contains("LIMIT 2"));
    assert!(sql.contains("OFFSET 2"));

    let second = page(&hr, &processor, ResultRequest::new(2, 2));
    assert_eq!(second.to_json()["items"], json!([[1, "Eric"], [2, "Erin"]]));
    assert_eq!(second.to_json()["page"], json!(2));

    let rest = page(&hr, &processor, ResultRequest::new(2, 3).stop_page(3));
    assert_eq!(rest.len(), 4);
}

#[test]
fn test_named_requests_share_a_connection() {
    let hr = Hr::new();
    let executor = hr.executor();
    let processor = hr.processor();
    let run = |page: u64| {
        ResultRequest::new(page, 4)
            .named("report")
            .execute(
                &processor,
                &executor,
                Arc::new(JsonExporter),
                &FormatterRegistry::new(),
                &Codes::new(),
                &ExportSettings::default(),
            )
            .unwrap()
    };

    assert_eq!(run(1).len(), 4);
    assert!(!executor.named().is_running("report"));
    let pid = executor.named().pid("report");
    assert!(pid.is_some());

    assert_eq!(run(2).len(), 3);
    assert_eq!(executor.named().pid("report"), pid);
    assert_eq!(executor.named().len(), 1);
}

#[test]
fn test_bad_page_is_an_input_error() {
    let hr = Hr::new();
    let err = ResultRequest::new(0, 10)
        .execute(
            &hr.processor(),
            &hr.executor(),
            Arc::new(JsonExporter),
            &FormatterRegistry::new(),
            &Codes::new(),
            &ExportSettings::default(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), "input");
}
