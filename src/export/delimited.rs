//! Comma-separated output.

use std::io::Write;

use super::{ExportResult, ExportSink, Exporter, HeaderColumn, Record};

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvExporter;

impl Exporter for CsvExporter {
    fn short_name(&self) -> &'static str {
        "csv"
    }

    fn file_extension(&self) -> &'static str {
        "csv"
    }

    fn content_type(&self) -> &'static str {
        "text/csv"
    }

    fn preferred_formats(&self) -> &'static [&'static str] {
        &["number", "string"]
    }

    fn write(
        &self,
        header: &[HeaderColumn],
        records: &mut dyn Iterator<Item = ExportResult<Record>>,
        sink: &mut dyn ExportSink,
    ) -> ExportResult<usize> {
        let out = sink.open("export.csv")?;
        write_csv(header, records, out)
    }
}

/// Header row of keys, then one line per record. Missing values are
/// written as empty cells.
pub(super) fn write_csv(
    header: &[HeaderColumn],
    records: &mut dyn Iterator<Item = ExportResult<Record>>,
    out: impl Write,
) -> ExportResult<usize> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(header.iter().map(|h| h.key.as_str()))?;
    let mut rows = 0;
    for record in records {
        let record = record?;
        writer.write_record(record.iter().map(|(_, value)| value.to_string()))?;
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}
