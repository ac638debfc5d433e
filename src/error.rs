//! Crate-level error taxonomy.
//!
//! Subsystems keep their own error enums; this one sorts them into the
//! kinds a caller acts on.

use thiserror::Error;

use crate::cache::CacheError;
use crate::catalog::CatalogError;
use crate::config::SettingsError;
use crate::engine::EngineError;
use crate::export::ExportError;
use crate::format::FormatError;
use crate::graph::GraphError;
use crate::query::{ParseError, PipelineError};
use crate::schema::SchemaError;
use crate::translate::TranslateError;

#[derive(Debug, Error)]
pub enum Error {
    /// A document or request is malformed beyond per-node annotation.
    #[error("Invalid input: {0}")]
    Input(String),

    /// A field, concept, context or view is missing or not permitted.
    #[error("{0}")]
    Reference(String),

    /// A value cannot be coerced to its field's type.
    #[error("{0}")]
    Type(String),

    #[error("{0}")]
    Operator(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Composite context {0} refers to itself")]
    CompositeCycle(i64),

    #[error(transparent)]
    Format(#[from] FormatError),

    /// The engine, the catalog store or an export sink failed.
    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Query '{0}' was cancelled")]
    Cancelled(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Input(_) => "input",
            Error::Reference(_) => "reference",
            Error::Type(_) => "type",
            Error::Operator(_) => "operator",
            Error::Graph(_) => "graph",
            Error::CompositeCycle(_) => "composite_cycle",
            Error::Format(_) => "format",
            Error::Execution(_) => "execution",
            Error::Cancelled(_) => "cancelled",
        }
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        Error::Execution(err.to_string())
    }
}

impl From<CacheError> for Error {
    fn from(err: CacheError) -> Self {
        Error::Execution(err.to_string())
    }
}

impl From<SettingsError> for Error {
    fn from(err: SettingsError) -> Self {
        Error::Input(err.to_string())
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::Io(_) | SchemaError::Sqlite(_) => Error::Execution(err.to_string()),
            other => Error::Input(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Input(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Execution(err.to_string())
    }
}

impl From<CatalogError> for Error {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::FieldNotFound(_)
            | CatalogError::AmbiguousField { .. }
            | CatalogError::ConceptNotFound(_)
            | CatalogError::ContextNotFound(_)
            | CatalogError::ViewNotFound(_)
            | CatalogError::UnsavedField(_) => Error::Reference(err.to_string()),
            other => Error::Execution(other.to_string()),
        }
    }
}

impl From<TranslateError> for Error {
    fn from(err: TranslateError) -> Self {
        match err {
            TranslateError::Graph(err) => Error::Graph(err),
            TranslateError::InvalidValue { .. } | TranslateError::InvalidShape { .. } => {
                Error::Type(err.to_string())
            }
            TranslateError::OperatorNotPermitted { .. } | TranslateError::InvalidOperator(_) => {
                Error::Operator(err.to_string())
            }
            TranslateError::UnknownTranslator(_) => Error::Reference(err.to_string()),
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Input(msg) => Error::Input(msg),
            ParseError::CompositeCycle(id) => Error::CompositeCycle(id),
            ParseError::Graph(err) => Error::Graph(err),
            ParseError::Catalog(err) => err.into(),
        }
    }
}

impl From<PipelineError> for Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Cancelled(name) => Error::Cancelled(name),
            PipelineError::Input(msg) => Error::Input(msg),
            PipelineError::Execution(err) => err.into(),
            PipelineError::Graph(err) => Error::Graph(err),
            PipelineError::Parse(err) => err.into(),
        }
    }
}

impl From<ExportError> for Error {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Format(err) => Error::Format(err),
            ExportError::UnknownExporter(_) => Error::Reference(err.to_string()),
            other => Error::Execution(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let err: Error = CatalogError::FieldNotFound("hr.employee.age".into()).into();
        assert_eq!(err.kind(), "reference");

        let err: Error = TranslateError::InvalidOperator("near".into()).into();
        assert_eq!(err.kind(), "operator");

        let err: Error = TranslateError::InvalidValue {
            value: "\"x\"".into(),
            expected: "number".into(),
        }
        .into();
        assert_eq!(err.kind(), "type");

        let err: Error = PipelineError::Cancelled("q".into()).into();
        assert_eq!(err.kind(), "cancelled");
        assert_eq!(err.to_string(), "Query 'q' was cancelled");

        let err: Error = ParseError::CompositeCycle(4).into();
        assert!(matches!(err, Error::CompositeCycle(4)));

        let err: Error = ExportError::RowWidth {
            expected: 3,
            actual: 2,
        }
        .into();
        assert_eq!(err.kind(), "execution");
    }
}
