//! Exporters: formatted rows written to files.
//!
//! An [`Export`] binds an [`Exporter`] to a parsed view. Every projected
//! facet gets a [`Formatter`] trying the exporter's preferred formats; a
//! row read from the engine is cut into one slice per formatter, and the
//! visible slices are formatted into a [`Record`].
//!
//! How rows are read is chosen per export with a [`ReadMode`].

mod delimited;
mod excel;
mod html;
mod json;
mod reader;
mod scripts;
mod sink;

pub use delimited::CsvExporter;
pub use excel::ExcelExporter;
pub use html::HtmlExporter;
pub use json::JsonExporter;
pub use reader::{ReadOptions, Records};
pub use scripts::{RExporter, SasExporter};
pub use sink::{BundleSink, DirSink, ExportSink, StreamSink};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::catalog::{Catalog, CatalogResult, Field};
use crate::engine::{Cursor, Engine};
use crate::format::{unique_keys, Column, FormatError, Formatted, Formatter, FormatterRegistry};
use crate::query::ParsedView;
use crate::schema::SimpleType;
use crate::value::Value;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("A single stream cannot hold '{file}' as well as '{first}'")]
    SingleStream { first: String, file: String },

    #[error("Row has {actual} values, formatters expect {expected}")]
    RowWidth { expected: usize, actual: usize },

    #[error("Unknown exporter '{0}'")]
    UnknownExporter(String),
}

pub type ExportResult<T> = Result<T, ExportError>;

/// One formatted output row: key to value, in column order.
pub type Record = Formatted;

/// Coded values of enumerable fields, by field id.
pub type Codes = HashMap<i64, Vec<(Value, i64)>>;

/// How rows are pulled and formatted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Format each row as it is read.
    #[default]
    Default,
    /// Memoize formatter output per distinct slice.
    Cached,
    /// Format batches on a worker pool, keeping row order.
    Threaded,
    CachedThreaded,
    /// Drop rows repeating a visible slice and apply offset/limit while
    /// reading.
    Manual,
}

impl ReadMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "default" => Some(ReadMode::Default),
            "cached" => Some(ReadMode::Cached),
            "threaded" => Some(ReadMode::Threaded),
            "cached_threaded" => Some(ReadMode::CachedThreaded),
            "manual" => Some(ReadMode::Manual),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadMode::Default => "default",
            ReadMode::Cached => "cached",
            ReadMode::Threaded => "threaded",
            ReadMode::CachedThreaded => "cached_threaded",
            ReadMode::Manual => "manual",
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, ReadMode::Cached | ReadMode::CachedThreaded)
    }

    pub fn is_threaded(&self) -> bool {
        matches!(self, ReadMode::Threaded | ReadMode::CachedThreaded)
    }
}

impl fmt::Display for ReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One output column as exporters describe it.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderColumn {
    pub key: String,
    pub label: String,
    pub simple_type: SimpleType,
    pub field: Option<Field>,
    pub concept_name: Option<String>,
    pub concept_description: Option<String>,
    pub codes: Option<Vec<(Value, i64)>>,
    /// Text values are escaped HTML already.
    pub markup: bool,
}

impl HeaderColumn {
    /// Field description, falling back to the label.
    pub fn description(&self) -> &str {
        self.field
            .as_ref()
            .and_then(|f| f.description.as_deref())
            .unwrap_or(&self.label)
    }
}

/// An output format.
pub trait Exporter: Send + Sync {
    fn short_name(&self) -> &'static str;

    fn file_extension(&self) -> &'static str;

    fn content_type(&self) -> &'static str;

    /// Formats tried first by every formatter, in order.
    fn preferred_formats(&self) -> &'static [&'static str];

    /// Write every record to `sink`, returning the number of rows.
    fn write(
        &self,
        header: &[HeaderColumn],
        records: &mut dyn Iterator<Item = ExportResult<Record>>,
        sink: &mut dyn ExportSink,
    ) -> ExportResult<usize>;
}

/// Name to exporter map. Built once, read-only afterwards.
#[derive(Clone)]
pub struct ExporterRegistry {
    exporters: HashMap<String, Arc<dyn Exporter>>,
}

impl Default for ExporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExporterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExporterRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl ExporterRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            exporters: HashMap::new(),
        };
        registry.register(Arc::new(CsvExporter));
        registry.register(Arc::new(JsonExporter));
        registry.register(Arc::new(ExcelExporter));
        registry.register(Arc::new(SasExporter));
        registry.register(Arc::new(RExporter));
        registry.register(Arc::new(HtmlExporter));
        registry
    }

    pub fn register(&mut self, exporter: Arc<dyn Exporter>) {
        self.exporters
            .insert(exporter.short_name().to_string(), exporter);
    }

    pub fn get(&self, name: &str) -> ExportResult<Arc<dyn Exporter>> {
        self.exporters
            .get(name)
            .cloned()
            .ok_or_else(|| ExportError::UnknownExporter(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.exporters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Coded values for every enumerable field the view projects.
pub fn load_codes(catalog: &Catalog, engine: &dyn Engine, view: &ParsedView) -> CatalogResult<Codes> {
    let mut codes = Codes::new();
    for facet in view.projected() {
        let Some(concept) = &facet.concept else {
            continue;
        };
        for cf in &concept.fields {
            if cf.field.enumerable && !codes.contains_key(&cf.field.id) {
                codes.insert(cf.field.id, catalog.coded_values(&cf.field, engine)?);
            }
        }
    }
    Ok(codes)
}

#[derive(Debug, Clone)]
struct Slot {
    formatter: Formatter,
    visible: bool,
}

/// An exporter bound to the formatters of one view.
pub struct Export {
    exporter: Arc<dyn Exporter>,
    slots: Vec<Slot>,
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Export")
            .field("exporter", &self.exporter.short_name())
            .field("slots", &self.slots)
            .finish()
    }
}

impl Export {
    /// One formatter per projected facet. A concept naming a format tries
    /// it before the exporter's preferred formats.
    pub fn new(
        exporter: Arc<dyn Exporter>,
        view: &ParsedView,
        formats: &FormatterRegistry,
        codes: &Codes,
    ) -> Self {
        let facets: Vec<_> = view
            .projected()
            .filter_map(|f| f.concept.as_ref().map(|c| (c, f.visible)))
            .collect();
        let fields: Vec<&Field> = facets
            .iter()
            .flat_map(|(c, _)| c.fields.iter().map(|cf| &cf.field))
            .collect();
        let mut keys = unique_keys(&fields).into_iter();

        let mut slots = Vec::with_capacity(facets.len());
        for (concept, visible) in facets {
            let columns = concept
                .fields
                .iter()
                .map(|cf| Column {
                    key: keys.next().unwrap_or_else(|| cf.field.column.clone()),
                    field: Some(cf.field.clone()),
                    codes: codes.get(&cf.field.id).cloned(),
                })
                .collect();
            let mut preferred: Vec<&str> = concept.formatter.iter().map(String::as_str).collect();
            preferred.extend(exporter.preferred_formats().iter().copied());
            slots.push(Slot {
                formatter: Formatter::new(concept.clone(), columns, formats.chain(&preferred)),
                visible,
            });
        }
        Self { exporter, slots }
    }

    /// Put a formatter in front of the others, e.g. a raw primary key.
    pub fn prepend(&mut self, formatter: Formatter) {
        self.slots.insert(
            0,
            Slot {
                formatter,
                visible: true,
            },
        );
    }

    pub fn exporter(&self) -> &dyn Exporter {
        self.exporter.as_ref()
    }

    /// Raw values consumed per row.
    pub fn row_width(&self) -> usize {
        self.slots.iter().map(|s| s.formatter.width()).sum()
    }

    pub fn has_hidden(&self) -> bool {
        self.slots.iter().any(|s| !s.visible)
    }

    /// Columns of the visible formatters.
    pub fn header(&self) -> Vec<HeaderColumn> {
        let mut out = Vec::new();
        for slot in self.slots.iter().filter(|s| s.visible) {
            let formatter = &slot.formatter;
            let concept = formatter.concept();
            let keys = formatter.header();
            let markup = formatter.emits_markup();
            if formatter.collapses() {
                out.extend(keys.into_iter().map(|key| HeaderColumn {
                    label: key.clone(),
                    key,
                    simple_type: SimpleType::String,
                    field: None,
                    concept_name: concept.map(|c| c.name.clone()),
                    concept_description: concept.and_then(|c| c.description.clone()),
                    codes: None,
                    markup,
                }));
                continue;
            }
            for (i, (key, column)) in keys.into_iter().zip(formatter.columns()).enumerate() {
                let label = concept
                    .and_then(|c| c.fields.get(i))
                    .map(|cf| cf.display_name().to_string())
                    .unwrap_or_else(|| key.clone());
                out.push(HeaderColumn {
                    key,
                    label,
                    simple_type: column
                        .field
                        .as_ref()
                        .map(|f| f.simple_type)
                        .unwrap_or(SimpleType::Key),
                    field: column.field.clone(),
                    concept_name: concept.map(|c| c.name.clone()),
                    concept_description: concept.and_then(|c| c.description.clone()),
                    codes: column.codes.clone(),
                    markup,
                });
            }
        }
        out
    }

    /// Read and format `cursor`.
    pub fn read(&self, cursor: Cursor, options: ReadOptions) -> ExportResult<Records<'_>> {
        Records::new(self, cursor, options)
    }

    /// Read `cursor` and hand the records to the exporter.
    pub fn write(
        &self,
        cursor: Cursor,
        options: ReadOptions,
        sink: &mut dyn ExportSink,
    ) -> ExportResult<usize> {
        let mode = options.mode;
        let header = self.header();
        let mut records = self.read(cursor, options)?;
        let rows = self.exporter.write(&header, &mut records, sink)?;
        info!(
            exporter = self.exporter.short_name(),
            read_mode = %mode,
            rows,
            "export finished"
        );
        Ok(rows)
    }

    /// Split `row` into formatter slices.
    fn slices<'r>(&self, row: &'r [Value]) -> ExportResult<Vec<&'r [Value]>> {
        let expected = self.row_width();
        if row.len() < expected {
            return Err(ExportError::RowWidth {
                expected,
                actual: row.len(),
            });
        }
        let mut rest = row;
        let mut out = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let (head, tail) = rest.split_at(slot.formatter.width());
            out.push(head);
            rest = tail;
        }
        Ok(out)
    }

    /// The values of the visible slices, in order.
    fn visible_values(&self, row: &[Value]) -> ExportResult<Vec<Value>> {
        Ok(self
            .slices(row)?
            .into_iter()
            .zip(&self.slots)
            .filter(|(_, slot)| slot.visible)
            .flat_map(|(values, _)| values.iter().cloned())
            .collect())
    }

    /// Each visible formatter must produce as many columns as its header.
    fn check_header(&self, row: &[Value]) -> ExportResult<()> {
        for (values, slot) in self.slices(row)?.into_iter().zip(&self.slots) {
            if !slot.visible {
                continue;
            }
            let expected = slot.formatter.header().len();
            let actual = slot.formatter.format(values).len();
            if expected != actual {
                return Err(FormatError::Mismatch {
                    formatter: slot.formatter.name().to_string(),
                    expected,
                    actual,
                }
                .into());
            }
        }
        Ok(())
    }
}
