//! # Avocado
//!
//! Metadata-driven query construction over a relational schema graph.
//!
//! ## Architecture
//!
//! Clients describe queries with two documents: a *context* (a boolean
//! tree of conditions over catalog fields) and a *view* (an ordered list
//! of concepts with sort directives). Both are validated against the
//! catalog, translated over the schema graph, executed and exported:
//!
//! ```text
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │ SchemaDescription (schema)   │   │ Catalog: fields, concepts     │
//! └──────────────────────────────┘   └──────────────────────────────┘
//!                │ [graph]                          │
//!                ▼                                  ▼
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │ JoinTree: lookup paths       │◄──│ ContextParser / ViewParser    │
//! └──────────────────────────────┘   │ + translators and operators   │
//!                │                   └──────────────────────────────┘
//!                ▼ [query]
//! ┌──────────────────────────────┐
//! │ QuerySet → SQL (sql)         │
//! └──────────────────────────────┘
//!                │ [engine] named, cancellable connections
//!                ▼
//! ┌──────────────────────────────┐
//! │ Formatters → Exporters       │
//! └──────────────────────────────┘
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod format;
pub mod graph;
pub mod operators;
pub mod query;
pub mod schema;
pub mod sql;
pub mod translate;
pub mod value;

pub use error::{Error, Result};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::catalog::{Catalog, Concept, Field, FieldRef};
    pub use crate::config::Settings;
    pub use crate::engine::{Engine, SqliteEngine};
    pub use crate::export::{Export, ExporterRegistry, ReadMode, ReadOptions};
    pub use crate::format::FormatterRegistry;
    pub use crate::graph::{JoinTree, SchemaGraph};
    pub use crate::query::{
        ContextParser, Executor, ParsedContext, ParsedView, QueryProcessor, QuerySet,
        ResultRequest, ViewParser,
    };
    pub use crate::schema::SchemaDescription;
    pub use crate::sql::Dialect;
    pub use crate::translate::TranslatorRegistry;
    pub use crate::value::Value;
    pub use crate::{Error, Result};
}
