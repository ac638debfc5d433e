//! JSON array output, one object per row.

use std::io::Write;

use super::{ExportResult, ExportSink, Exporter, HeaderColumn, Record};

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonExporter;

impl Exporter for JsonExporter {
    fn short_name(&self) -> &'static str {
        "json"
    }

    fn file_extension(&self) -> &'static str {
        "json"
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn preferred_formats(&self) -> &'static [&'static str] {
        &["json", "number", "string"]
    }

    fn write(
        &self,
        _header: &[HeaderColumn],
        records: &mut dyn Iterator<Item = ExportResult<Record>>,
        sink: &mut dyn ExportSink,
    ) -> ExportResult<usize> {
        let mut out = sink.open("export.json")?;
        out.write_all(b"[")?;
        let mut rows = 0;
        for record in records {
            let record = record?;
            if rows > 0 {
                out.write_all(b",")?;
            }
            // Written by hand so keys keep column order.
            out.write_all(b"{")?;
            for (i, (key, value)) in record.iter().enumerate() {
                if i > 0 {
                    out.write_all(b",")?;
                }
                serde_json::to_writer(&mut out, key)?;
                out.write_all(b":")?;
                serde_json::to_writer(&mut out, &value.to_json())?;
            }
            out.write_all(b"}")?;
            rows += 1;
        }
        out.write_all(b"]")?;
        out.flush()?;
        Ok(rows)
    }
}
