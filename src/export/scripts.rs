//! Statistical package output: a `data.csv` plus a script that loads it
//! with labels and value formats.

use std::fmt::Write as _;
use std::io::Write;

use inflector::cases::camelcase::to_camel_case;
use once_cell::sync::Lazy;
use regex::Regex;

use super::delimited::write_csv;
use super::{ExportResult, ExportSink, Exporter, HeaderColumn, Record};
use crate::schema::SimpleType;

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());

const DATA_FILE: &str = "data.csv";

/// SAS variable names hold at most 32 characters.
const SAS_NAME_LIMIT: usize = 30;

fn clean_name(name: &str) -> String {
    let name = PUNCTUATION.replace_all(name, "").replace(' ', "_");
    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("_{}", name)
    } else {
        name
    }
}

fn quote(s: &str) -> String {
    s.replace('"', "'")
}

/// SAS script and data.
#[derive(Debug, Default, Clone, Copy)]
pub struct SasExporter;

impl SasExporter {
    fn informat(simple_type: SimpleType) -> (&'static str, &'static str) {
        match simple_type {
            SimpleType::String => ("$255.", "$255."),
            SimpleType::Date => ("MMDDYY10.", "MMDDYY10."),
            SimpleType::Datetime => ("DATETIME20.", "DATETIME20."),
            SimpleType::Time => ("TIME8.", "TIME8."),
            SimpleType::Key | SimpleType::Number | SimpleType::Boolean => ("best32.", "best12."),
        }
    }

    /// The SAS script for `header`, reading [`DATA_FILE`].
    pub fn script(header: &[HeaderColumn]) -> String {
        let mut long_names = 0;
        let mut informats = String::new();
        let mut formats = String::new();
        let mut inputs = String::new();
        let mut labels = String::new();
        let mut values = String::new();
        let mut value_formats = String::new();

        for column in header {
            let mut name = clean_name(&column.key);
            if name.chars().count() >= SAS_NAME_LIMIT {
                long_names += 1;
                let head: String = name.chars().take(20).collect();
                name = format!("{}_lg_{}", head, long_names);
            }
            let (informat, format) = Self::informat(column.simple_type);
            let _ = writeln!(informats, "\tinformat {:<10}{:>10};", name, informat);
            let _ = writeln!(formats, "\tformat {:<10}{:>10};", name, format);

            inputs.push_str("\t\t");
            inputs.push_str(&name);
            if column.simple_type == SimpleType::String {
                inputs.push_str(" $");
            }
            inputs.push('\n');

            if let Some(codes) = column.codes.as_ref().filter(|c| !c.is_empty()) {
                let _ = writeln!(value_formats, "\tformat {0} {0}_f.;", name);
                let _ = write!(values, "\tvalue {}_f ", name);
                for (i, (value, code)) in codes.iter().enumerate() {
                    let _ = write!(values, "{}=\"{}\" ", code, quote(&value.to_string()));
                    if i % 2 == 1 && i + 1 != codes.len() {
                        values.push_str("\n\t\t");
                    }
                }
                values.push_str(";\n");
            }

            let _ = writeln!(labels, "\tlabel {}=\"{}\";", name, quote(column.description()));
        }

        let mut script = String::new();
        script.push_str("data SAS_EXPORT;\n");
        let _ = writeln!(script, "INFILE \"{}\" TRUNCOVER DSD firstobs=2;", DATA_FILE);
        script.push_str(&informats);
        script.push('\n');
        script.push_str(&formats);
        script.push('\n');
        let _ = write!(script, "input\n{};\n\nrun;\n", inputs);
        script.push_str("proc contents;run;\n\ndata SAS_EXPORT;\n\tset SAS_EXPORT;\n");
        let _ = write!(script, "{}\trun;\n\n", labels);
        let _ = write!(script, "proc format;\n{}\nrun;\n\n", values);
        script.push_str("data SAS_EXPORT;\n\tset SAS_EXPORT;\n\n");
        let _ = write!(script, "{}run;\n\n", value_formats);
        script.push_str("run;\nquit;\n");
        script
    }
}

impl Exporter for SasExporter {
    fn short_name(&self) -> &'static str {
        "sas"
    }

    fn file_extension(&self) -> &'static str {
        "zip"
    }

    fn content_type(&self) -> &'static str {
        "application/zip"
    }

    fn preferred_formats(&self) -> &'static [&'static str] {
        &["coded", "number", "string"]
    }

    fn write(
        &self,
        header: &[HeaderColumn],
        records: &mut dyn Iterator<Item = ExportResult<Record>>,
        sink: &mut dyn ExportSink,
    ) -> ExportResult<usize> {
        {
            let mut out = sink.open("export.sas")?;
            out.write_all(Self::script(header).as_bytes())?;
            out.flush()?;
        }
        write_csv(header, records, sink.open(DATA_FILE)?)
    }
}

/// R script and data.
#[derive(Debug, Default, Clone, Copy)]
pub struct RExporter;

impl RExporter {
    fn variable(key: &str) -> String {
        let name = to_camel_case(&clean_name(key));
        if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            format!("_{}", name)
        } else {
            name
        }
    }

    /// The R script for `header`, reading [`DATA_FILE`].
    pub fn script(header: &[HeaderColumn]) -> String {
        let mut labels = Vec::new();
        let mut factors = String::new();
        let mut levels = String::new();

        for column in header {
            let data = format!("data${}", Self::variable(&column.key));
            labels.push(format!(
                "attr({}, \"label\") = \"{}\"",
                data,
                quote(column.description())
            ));
            if let Some(codes) = column.codes.as_ref().filter(|c| !c.is_empty()) {
                let numbers: Vec<String> = codes.iter().map(|(_, code)| code.to_string()).collect();
                let names: Vec<String> = codes
                    .iter()
                    .map(|(value, _)| format!("\"{}\"", quote(&value.to_string())))
                    .collect();
                let _ = writeln!(
                    factors,
                    "{0}.factor = factor({0},levels=c({1}))",
                    data,
                    numbers.join(" ,")
                );
                let _ = writeln!(levels, "levels({}.factor)=c({})", data, names.join(" ,"));
            }
        }

        let mut script = String::new();
        let _ = write!(script, "# Read Data\ndata=read.csv(\"{}\")\n\n", DATA_FILE);
        let _ = write!(script, "# Setting Labels\n{}\n\n", labels.join("\n"));
        let _ = write!(script, "# Setting Factors\n{}\n", factors);
        let _ = write!(script, "# Setting Levels\n{}\n", levels);
        script
    }
}

impl Exporter for RExporter {
    fn short_name(&self) -> &'static str {
        "r"
    }

    fn file_extension(&self) -> &'static str {
        "zip"
    }

    fn content_type(&self) -> &'static str {
        "application/zip"
    }

    fn preferred_formats(&self) -> &'static [&'static str] {
        &["coded", "number", "string"]
    }

    fn write(
        &self,
        header: &[HeaderColumn],
        records: &mut dyn Iterator<Item = ExportResult<Record>>,
        sink: &mut dyn ExportSink,
    ) -> ExportResult<usize> {
        {
            let mut out = sink.open("export.R")?;
            out.write_all(Self::script(header).as_bytes())?;
            out.flush()?;
        }
        write_csv(header, records, sink.open(DATA_FILE)?)
    }
}
