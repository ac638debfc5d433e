//! Named queries cancelled from another thread.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use avocado::query::{Executor, PipelineError};
use avocado::value::Value;

use common::Hr;

const ENDLESS: &str = "WITH RECURSIVE c(x) AS \
    (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 100000000000) \
    SELECT count(*) FROM c";

fn wait_until_running(executor: &Executor, name: &str) {
    let started = Instant::now();
    while !executor.named().is_running(name) {
        assert!(started.elapsed() < Duration::from_secs(10), "{} never started", name);
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_cancel_running_query() {
    let hr = Hr::new();
    let executor = Arc::new(hr.executor());

    let endless = {
        let executor = executor.clone();
        thread::spawn(move || executor.query(ENDLESS, Some("Q")))
    };
    wait_until_running(&executor, "Q");

    // a second name runs to completion while Q is still busy
    let other = {
        let executor = executor.clone();
        thread::spawn(move || {
            executor
                .query("SELECT id FROM employee ORDER BY id", Some("R"))
                .map(|cursor| cursor.fetch_all())
        })
    };
    let rows = other.join().unwrap().unwrap();
    assert_eq!(rows.len(), 7);
    assert_eq!(rows[0], vec![Value::Int(1)]);
    assert!(executor.named().is_running("Q"));
    assert_ne!(executor.named().pid("Q"), executor.named().pid("R"));

    assert!(executor.cancel("Q").unwrap());
    let result = endless.join().unwrap();
    assert!(matches!(result, Err(PipelineError::Cancelled(name)) if name == "Q"));
    assert!(!executor.named().is_running("Q"));
    assert!(executor.named().pid("Q").is_none());
    assert!(!executor.cancel("Q").unwrap());

    // R keeps its connection
    assert!(executor.named().pid("R").is_some());
    assert!(executor.named().close("R"));
    assert!(executor.named().is_empty());
}

#[test]
fn test_cancel_unknown_name() {
    let hr = Hr::new();
    let executor = hr.executor();
    assert!(!executor.cancel("nothing").unwrap());
}

#[test]
fn test_request_cancels_previous_run_of_its_name() {
    use avocado::config::ExportSettings;
    use avocado::export::{Codes, CsvExporter};
    use avocado::format::FormatterRegistry;
    use avocado::query::ResultRequest;

    let hr = Hr::new();
    let executor = Arc::new(hr.executor());
    let worker = {
        let executor = executor.clone();
        thread::spawn(move || executor.query(ENDLESS, Some("report")))
    };
    wait_until_running(&executor, "report");

    let page = ResultRequest::new(1, 3)
        .named("report")
        .execute(
            &hr.processor(),
            &executor,
            Arc::new(CsvExporter),
            &FormatterRegistry::new(),
            &Codes::new(),
            &ExportSettings::default(),
        )
        .unwrap();
    assert_eq!(page.len(), 3);
    assert!(matches!(
        worker.join().unwrap(),
        Err(PipelineError::Cancelled(_))
    ));
}
