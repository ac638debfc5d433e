//! Exports of a live query through every output format.

#[path = "../common/mod.rs"]
mod common;

use avocado::engine::Cursor;
use avocado::export::{
    load_codes, BundleSink, Codes, ExportError, ExportResult, ExporterRegistry, ReadMode,
    ReadOptions, Record, StreamSink,
};
use avocado::format::FormatterRegistry;
use avocado::query::QueryProcessor;
use avocado::value::Value;
use serde_json::json;

use common::Hr;

const VIEW: &str = r#"[
    {"concept": "Name", "sort": "asc"},
    {"concept": "Office"},
    {"concept": "Manager"}
]"#;

fn processor(hr: &Hr) -> QueryProcessor {
    let view = hr.view(serde_json::from_str(VIEW).unwrap());
    hr.processor().view(view)
}

/// Run the query and export it with `exporter` into a stream.
fn export_text(hr: &Hr, exporter: &str, codes: &Codes) -> String {
    let processor = processor(hr);
    let exporter = ExporterRegistry::new().get(exporter).unwrap();
    let export = processor.get_exporter(exporter, &FormatterRegistry::new(), codes);
    let cursor = processor
        .get_iterable(&hr.executor(), None, None, None)
        .unwrap();
    let mut sink = StreamSink::new(Vec::new());
    let rows = export.write(cursor, ReadOptions::default(), &mut sink).unwrap();
    assert_eq!(rows, 7);
    String::from_utf8(sink.into_inner()).unwrap()
}

#[test]
fn test_csv() {
    let hr = Hr::new();
    let text = export_text(&hr, "csv", &Codes::new());
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "id,first_name,last_name,location,is_manager");
    assert_eq!(lines[1], "5,Ann,Kay,,0");
    assert_eq!(lines[3], "1,Eric,Smith,Boston,1");
    assert_eq!(lines.len(), 8);
}

#[test]
fn test_json_keeps_column_order_and_native_types() {
    let hr = Hr::new();
    let text = export_text(&hr, "json", &Codes::new());
    assert!(text.starts_with(r#"[{"id":5,"first_name":"Ann","last_name":"Kay","#));

    let rows: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        rows[2],
        json!({
            "id": 1,
            "first_name": "Eric",
            "last_name": "Smith",
            "location": "Boston",
            "is_manager": true
        })
    );
}

#[test]
fn test_html_collapses_concepts() {
    let hr = Hr::new();
    let text = export_text(&hr, "html", &Codes::new());
    assert!(text.starts_with("<table>"));
    assert!(text.contains("<th>id</th><th>Name</th>"));
    assert!(text.contains("<tr><td>5</td><td>Ann Kay</td>"));
}

#[test]
fn test_concept_format_ahead_of_html_keeps_columns() {
    let hr = Hr::new();
    let mut name = hr.concept("Name");
    name.formatter = Some("number".into());
    hr.catalog.save_concept(&mut name).unwrap();

    let text = export_text(&hr, "html", &Codes::new());
    assert!(text.contains("<th>id</th><th>First Name</th><th>Last Name</th>"));
    assert!(text.contains("<tr><td>5</td><td>Ann</td><td>Kay</td>"));
}

#[test]
fn test_excel_has_data_dictionary() {
    let hr = Hr::new();
    let text = export_text(&hr, "excel", &Codes::new());
    assert!(text.contains("<Worksheet ss:Name=\"Data\">"));
    assert!(text.contains("<Worksheet ss:Name=\"Data Dictionary\">"));
    assert!(text.contains("Field Name"));
}

#[test]
fn test_sas_bundle_uses_codes() {
    let hr = Hr::new();
    let processor = processor(&hr);
    let view = processor.parsed_view().unwrap().clone();
    let codes = load_codes(&hr.catalog, hr.engine.as_ref(), &view).unwrap();
    let location = hr.field("hr.office.location");
    assert_eq!(
        codes[&location.id],
        vec![(Value::from("Boston"), 1), (Value::from("Denver"), 2)]
    );

    let exporter = ExporterRegistry::new().get("sas").unwrap();
    assert_eq!(exporter.file_extension(), "zip");
    let export = processor.get_exporter(exporter, &FormatterRegistry::new(), &codes);
    let cursor = processor
        .get_iterable(&hr.executor(), None, None, None)
        .unwrap();
    let mut bundle = BundleSink::new();
    export.write(cursor, ReadOptions::default(), &mut bundle).unwrap();
    assert_eq!(bundle.names(), vec!["data.csv", "export.sas"]);

    let script = String::from_utf8(bundle.get("export.sas").unwrap().to_vec()).unwrap();
    assert!(script.contains("INFILE \"data.csv\" TRUNCOVER DSD firstobs=2;"));
    assert!(script.contains("\tvalue location_f 1=\"Boston\" 2=\"Denver\" ;\n"));
    assert!(script.contains("\tformat location location_f.;\n"));

    let data = String::from_utf8(bundle.get("data.csv").unwrap().to_vec()).unwrap();
    let lines: Vec<&str> = data.lines().collect();
    assert_eq!(lines[0], "id,first_name,last_name,location,is_manager");
    // Ann is first of seven names and fourth of seven surnames
    assert_eq!(lines[1], "5,1,4,,1");
}

#[test]
fn test_r_bundle() {
    let hr = Hr::new();
    let processor = processor(&hr);
    let exporter = ExporterRegistry::new().get("r").unwrap();
    let export = processor.get_exporter(exporter, &FormatterRegistry::new(), &Codes::new());
    let cursor = processor
        .get_iterable(&hr.executor(), None, None, None)
        .unwrap();
    let mut bundle = BundleSink::new();
    export.write(cursor, ReadOptions::default(), &mut bundle).unwrap();

    let script = String::from_utf8(bundle.get("export.R").unwrap().to_vec()).unwrap();
    assert!(script.starts_with("# Read Data\ndata=read.csv(\"data.csv\")"));
    assert!(script.contains("attr(data$firstName, \"label\") = \"First Name\""));
}

fn read_all(hr: &Hr, mode: ReadMode) -> Vec<Record> {
    let processor = processor(hr);
    let exporter = ExporterRegistry::new().get("csv").unwrap();
    let export = processor.get_exporter(exporter, &FormatterRegistry::new(), &Codes::new());
    let cursor = processor
        .get_iterable(&hr.executor(), None, None, None)
        .unwrap();
    let options = ReadOptions {
        threads: 3,
        chunk_size: 2,
        ..ReadOptions::default()
    }
    .mode(mode);
    export
        .read(cursor, options)
        .unwrap()
        .collect::<ExportResult<Vec<_>>>()
        .unwrap()
}

#[test]
fn test_read_modes_agree() {
    let hr = Hr::new();
    let expected = read_all(&hr, ReadMode::Default);
    assert_eq!(expected.len(), 7);
    for mode in [ReadMode::Cached, ReadMode::Threaded, ReadMode::CachedThreaded] {
        assert_eq!(read_all(&hr, mode), expected, "read mode {}", mode);
    }
}

#[test]
fn test_short_rows_are_rejected() {
    let hr = Hr::new();
    let processor = processor(&hr);
    let exporter = ExporterRegistry::new().get("csv").unwrap();
    let export = processor.get_exporter(exporter, &FormatterRegistry::new(), &Codes::new());
    let cursor = Cursor::new(vec!["id".into()], vec![vec![Value::Int(1)]]);
    let first = export.read(cursor, ReadOptions::default()).unwrap().next();
    assert!(matches!(
        first,
        Some(Err(ExportError::RowWidth {
            expected: 5,
            actual: 1
        }))
    ));
}

#[test]
fn test_unknown_exporter() {
    assert!(matches!(
        ExporterRegistry::new().get("pdf"),
        Err(ExportError::UnknownExporter(_))
    ));
}
