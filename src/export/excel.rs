//! Excel workbook output as SpreadsheetML 2003.
//!
//! Two worksheets: the data, and a dictionary describing every column.

use std::io::Write;

use super::{ExportResult, ExportSink, Exporter, HeaderColumn, Record};
use crate::format::escape_html as escape;
use crate::value::Value;

const WORKBOOK_OPEN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<?mso-application progid="Excel.Sheet"?>
<Workbook xmlns="urn:schemas-microsoft-com:office:spreadsheet" xmlns:ss="urn:schemas-microsoft-com:office:spreadsheet">
"#;

const DICTIONARY_HEADER: [&str; 5] = [
    "Field Name",
    "Data Type",
    "Description",
    "Concept Name",
    "Concept Description",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct ExcelExporter;

impl Exporter for ExcelExporter {
    fn short_name(&self) -> &'static str {
        "excel"
    }

    fn file_extension(&self) -> &'static str {
        "xml"
    }

    fn content_type(&self) -> &'static str {
        "application/vnd.ms-excel"
    }

    fn preferred_formats(&self) -> &'static [&'static str] {
        &["boolean", "number", "string"]
    }

    fn write(
        &self,
        header: &[HeaderColumn],
        records: &mut dyn Iterator<Item = ExportResult<Record>>,
        sink: &mut dyn ExportSink,
    ) -> ExportResult<usize> {
        let mut out = sink.open("export.xml")?;
        out.write_all(WORKBOOK_OPEN.as_bytes())?;

        out.write_all(b"<Worksheet ss:Name=\"Data\">\n<Table>\n")?;
        write_text_row(&mut out, header.iter().map(|h| h.key.as_str()))?;
        let mut rows = 0;
        for record in records {
            let record = record?;
            out.write_all(b"<Row>")?;
            for (_, value) in &record {
                write_cell(&mut out, value)?;
            }
            out.write_all(b"</Row>\n")?;
            rows += 1;
        }
        out.write_all(b"</Table>\n</Worksheet>\n")?;

        out.write_all(b"<Worksheet ss:Name=\"Data Dictionary\">\n<Table>\n")?;
        write_text_row(&mut out, DICTIONARY_HEADER.iter().copied())?;
        for column in header {
            write_text_row(
                &mut out,
                [
                    column.key.as_str(),
                    column.simple_type.as_str(),
                    column.description(),
                    column.concept_name.as_deref().unwrap_or(""),
                    column.concept_description.as_deref().unwrap_or(""),
                ]
                .into_iter(),
            )?;
        }
        out.write_all(b"</Table>\n</Worksheet>\n</Workbook>\n")?;
        out.flush()?;
        Ok(rows)
    }
}

fn write_text_row<'s>(out: &mut dyn Write, cells: impl Iterator<Item = &'s str>) -> ExportResult<()> {
    out.write_all(b"<Row>")?;
    for cell in cells {
        write!(out, "<Cell><Data ss:Type=\"String\">{}</Data></Cell>", escape(cell))?;
    }
    out.write_all(b"</Row>\n")?;
    Ok(())
}

fn write_cell(out: &mut dyn Write, value: &Value) -> ExportResult<()> {
    match value {
        Value::Null => out.write_all(b"<Cell/>")?,
        Value::Bool(b) => write!(
            out,
            "<Cell><Data ss:Type=\"Boolean\">{}</Data></Cell>",
            u8::from(*b)
        )?,
        Value::Int(_) | Value::Float(_) => {
            write!(out, "<Cell><Data ss:Type=\"Number\">{}</Data></Cell>", value)?
        }
        Value::Text(s) => write!(out, "<Cell><Data ss:Type=\"String\">{}</Data></Cell>", escape(s))?,
    }
    Ok(())
}
