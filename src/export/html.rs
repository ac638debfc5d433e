//! A bare HTML table.

use std::io::Write;

use super::{ExportResult, ExportSink, Exporter, HeaderColumn, Record};
use crate::format::escape_html;
use crate::value::Value;

#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlExporter;

impl Exporter for HtmlExporter {
    fn short_name(&self) -> &'static str {
        "html"
    }

    fn file_extension(&self) -> &'static str {
        "html"
    }

    fn content_type(&self) -> &'static str {
        "text/html"
    }

    fn preferred_formats(&self) -> &'static [&'static str] {
        &["html", "string"]
    }

    fn write(
        &self,
        header: &[HeaderColumn],
        records: &mut dyn Iterator<Item = ExportResult<Record>>,
        sink: &mut dyn ExportSink,
    ) -> ExportResult<usize> {
        let mut out = sink.open("export.html")?;
        out.write_all(b"<table>\n<thead><tr>")?;
        for column in header {
            write!(out, "<th>{}</th>", escape_html(&column.label))?;
        }
        out.write_all(b"</tr></thead>\n<tbody>\n")?;
        let mut rows = 0;
        for record in records {
            let record = record?;
            out.write_all(b"<tr>")?;
            for ((_, value), column) in record.iter().zip(header) {
                let cell = match value {
                    Value::Text(s) if column.markup => s.clone(),
                    other => escape_html(&other.to_string()),
                };
                write!(out, "<td>{}</td>", cell)?;
            }
            out.write_all(b"</tr>\n")?;
            rows += 1;
        }
        out.write_all(b"</tbody>\n</table>\n")?;
        out.flush()?;
        Ok(rows)
    }
}
