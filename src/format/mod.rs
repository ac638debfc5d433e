//! Per-concept formatting of raw result values.
//!
//! A [`Format`] turns one raw value (or, when it processes multiple, a
//! concept's whole slice) into an output value. A [`Formatter`] binds a
//! concept's fields to an ordered list of formats and tries them in turn,
//! falling back to `raw`, which never fails.

mod builtin;

pub use builtin::{
    BooleanFormat, CodedFormat, HtmlFormat, JsonFormat, NumberFormat, RawFormat, StringFormat,
};
pub(crate) use builtin::escape_html;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace};

use crate::catalog::{Concept, Field};
use crate::value::Value;

/// Name of the format every formatter falls back to.
pub const RAW: &str = "raw";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormatError {
    /// The format does not apply to this value; the next one is tried.
    #[error("format '{format}' cannot represent {value}")]
    Unsupported { format: &'static str, value: String },

    /// A formatter produced a different number of columns than its header.
    #[error("formatter '{formatter}' produced {actual} columns, header declares {expected}")]
    Mismatch {
        formatter: String,
        expected: usize,
        actual: usize,
    },
}

impl FormatError {
    pub fn unsupported(format: &'static str, value: &Value) -> Self {
        FormatError::Unsupported {
            format,
            value: format!("{:?}", value),
        }
    }
}

pub type FormatResult<T> = Result<T, FormatError>;

/// Formatted output of one formatter: output key to value, in order.
pub type Formatted = Vec<(String, Value)>;

/// What a format sees of the column a value came from.
#[derive(Debug, Clone, Copy)]
pub struct FieldContext<'a> {
    /// Unique output key of the column.
    pub key: &'a str,
    /// `None` for columns outside the catalog, such as the primary key.
    pub field: Option<&'a Field>,
    /// Coded values of an enumerable field, when loaded.
    pub codes: Option<&'a [(Value, i64)]>,
}

/// One named output format.
pub trait Format: Send + Sync {
    fn name(&self) -> &'static str;

    /// Receives a concept's values together instead of one at a time.
    fn process_multiple(&self) -> bool {
        false
    }

    /// Output text is already escaped HTML.
    fn emits_markup(&self) -> bool {
        false
    }

    fn format_value(&self, value: &Value, cx: &FieldContext<'_>) -> FormatResult<Value>;

    /// Format a whole slice. Only called when [`Format::process_multiple`].
    fn format_values(
        &self,
        values: &[Value],
        _fields: &[FieldContext<'_>],
        _concept: Option<&Concept>,
    ) -> FormatResult<Formatted> {
        Err(FormatError::Unsupported {
            format: self.name(),
            value: format!("{:?}", values),
        })
    }
}

/// Name to format map. Built once, read-only afterwards.
#[derive(Clone)]
pub struct FormatterRegistry {
    formats: HashMap<String, Arc<dyn Format>>,
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FormatterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatterRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl FormatterRegistry {
    /// The built-in formats.
    pub fn new() -> Self {
        let mut registry = Self {
            formats: HashMap::new(),
        };
        registry.register(Arc::new(BooleanFormat));
        registry.register(Arc::new(NumberFormat));
        registry.register(Arc::new(StringFormat));
        registry.register(Arc::new(CodedFormat));
        registry.register(Arc::new(HtmlFormat));
        registry.register(Arc::new(JsonFormat));
        registry.register(Arc::new(RawFormat));
        registry
    }

    pub fn register(&mut self, format: Arc<dyn Format>) {
        self.formats.insert(format.name().to_string(), format);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Format>> {
        self.formats.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.formats.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve `preferred` in order, dropping unknown names and ending
    /// with `raw`.
    pub fn chain(&self, preferred: &[&str]) -> Vec<Arc<dyn Format>> {
        let mut chain: Vec<Arc<dyn Format>> = Vec::new();
        for name in preferred.iter().copied().chain(std::iter::once(RAW)) {
            match self.get(name) {
                Some(format) if !chain.iter().any(|f| f.name() == format.name()) => {
                    chain.push(format)
                }
                Some(_) => {}
                None => debug!(format = name, "skipping unregistered format"),
            }
        }
        if chain.is_empty() {
            chain.push(Arc::new(RawFormat));
        }
        chain
    }
}

/// One output column of a formatter, before formatting.
#[derive(Debug, Clone)]
pub struct Column {
    pub key: String,
    pub field: Option<Field>,
    pub codes: Option<Vec<(Value, i64)>>,
}

/// Formats one concept's slice of a row.
#[derive(Clone)]
pub struct Formatter {
    name: String,
    concept: Option<Concept>,
    columns: Vec<Column>,
    formats: Vec<Arc<dyn Format>>,
}

impl std::fmt::Debug for Formatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Formatter")
            .field("name", &self.name)
            .field("keys", &self.columns.iter().map(|c| &c.key).collect::<Vec<_>>())
            .field(
                "formats",
                &self.formats.iter().map(|f| f.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Formatter {
    /// Formatter for `concept`, whose fields map to `columns` in order.
    pub fn new(concept: Concept, columns: Vec<Column>, formats: Vec<Arc<dyn Format>>) -> Self {
        Self {
            name: concept.name.clone(),
            concept: Some(concept),
            columns,
            formats,
        }
    }

    /// Pass-through formatter for a single column outside the catalog.
    pub fn raw(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            concept: None,
            columns: vec![Column {
                key,
                field: None,
                codes: None,
            }],
            formats: vec![Arc::new(RawFormat)],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn concept(&self) -> Option<&Concept> {
        self.concept.as_ref()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Raw values this formatter consumes per row.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Whether the first format of the chain takes the whole slice. The
    /// concept then formats into a single column named after it.
    pub fn collapses(&self) -> bool {
        self.concept.is_some() && self.formats.first().is_some_and(|f| f.process_multiple())
    }

    /// Whether the output is escaped HTML rather than plain text.
    pub fn emits_markup(&self) -> bool {
        self.collapses() && self.formats.first().is_some_and(|f| f.emits_markup())
    }

    /// Declared output keys, always matching what [`Formatter::format`]
    /// returns.
    pub fn header(&self) -> Vec<String> {
        if self.collapses() {
            vec![self.name.clone()]
        } else {
            self.columns.iter().map(|c| c.key.clone()).collect()
        }
    }

    /// Format one slice of exactly [`Formatter::width`] values.
    ///
    /// A collapsing formatter tries its leading multi-value formats in
    /// order; when none applies, the per-value output is joined into the
    /// concept's column. Otherwise each value goes through the single-value
    /// formats in chain order and multi-value formats are never used.
    pub fn format(&self, values: &[Value]) -> Formatted {
        let contexts: Vec<FieldContext<'_>> = self
            .columns
            .iter()
            .map(|c| FieldContext {
                key: &c.key,
                field: c.field.as_ref(),
                codes: c.codes.as_deref(),
            })
            .collect();

        if !self.collapses() {
            return values
                .iter()
                .zip(&contexts)
                .map(|(value, cx)| (cx.key.to_string(), self.format_single(value, cx)))
                .collect();
        }

        for format in self.formats.iter().take_while(|f| f.process_multiple()) {
            match format.format_values(values, &contexts, self.concept.as_ref()) {
                Ok(output) if output.len() == 1 => return output,
                Ok(output) => debug!(
                    formatter = %self.name,
                    format = format.name(),
                    columns = output.len(),
                    "multi-value format returned more than one column"
                ),
                Err(err) => debug!(formatter = %self.name, error = %err, "multi-value format failed"),
            }
        }

        let text = values
            .iter()
            .zip(&contexts)
            .map(|(value, cx)| self.format_single(value, cx))
            .filter(|v| !v.is_null())
            .map(|v| v.to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let text = if self.emits_markup() {
            escape_html(&text)
        } else {
            text
        };
        vec![(self.name.clone(), Value::Text(text))]
    }

    /// First single-value format that accepts `value`, the value itself
    /// when none does.
    fn format_single(&self, value: &Value, cx: &FieldContext<'_>) -> Value {
        self.formats
            .iter()
            .filter(|f| !f.process_multiple())
            .find_map(|format| match format.format_value(value, cx) {
                Ok(v) => Some(v),
                Err(err) => {
                    trace!(key = cx.key, error = %err, "format skipped");
                    None
                }
            })
            .unwrap_or_else(|| value.clone())
    }
}

/// Output keys for `fields`, unique across the list.
///
/// A column name is used as is when it occurs once. Every occurrence of a
/// repeated name is prefixed with `model__`, or with `app__model__` when
/// the first conflicting field's model contributes more than one field.
pub fn unique_keys(fields: &[&Field]) -> Vec<String> {
    let mut per_model: HashMap<(&str, &str), usize> = HashMap::new();
    let mut per_name: HashMap<&str, usize> = HashMap::new();
    for field in fields {
        *per_model.entry((&field.app, &field.model)).or_default() += 1;
        *per_name.entry(&field.column).or_default() += 1;
    }

    let mut prefixing: BTreeMap<&str, bool> = BTreeMap::new();
    fields
        .iter()
        .map(|field| {
            let name = field.column.as_str();
            if per_name[name] == 1 {
                return name.to_string();
            }
            let with_app = *prefixing
                .entry(name)
                .or_insert_with(|| per_model[&(field.app.as_str(), field.model.as_str())] > 1);
            if with_app {
                format!("{}__{}__{}", field.app, field.model, name)
            } else {
                format!("{}__{}", field.model, name)
            }
        })
        .collect()
}
