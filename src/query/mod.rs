//! Query documents and their execution.
//!
//! - [`ContextParser`]: filter trees compiled into conditions
//! - [`ViewParser`]: facet lists compiled into projections and ordering
//! - [`QuerySet`]: lookup-path builder shared by both
//! - [`QueryProcessor`]: context + view composed and executed
//! - [`NamedConnections`]: cancellable connections keyed by query name
//! - [`ResultRequest`]: paged result reads
//!
//! Problems with a single document node are recorded on the node as
//! [`ErrorKey`]s and [`WarningKey`]s; only structural problems fail a parse.

mod context;
mod named;
mod pipeline;
mod queryset;
mod results;
mod view;

pub use context::{BranchType, ContextNode, ContextParser, NodeKind, ParsedContext};
pub use named::{NamedConnections, NAMED_ALIAS_PREFIX};
pub use pipeline::{Executor, PipelineError, PipelineResult, QueryProcessor};
pub use queryset::{OrderTerm, QuerySet};
pub use results::{ResultPage, ResultRequest};
pub use view::{Facet, ParsedView, SortDirection, ViewParser};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::graph::GraphError;

/// Node problems that disable the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKey {
    InvalidBranchType,
    EmptyBranch,
    FieldDoesNotExist,
    AmbiguousField,
    ConceptDoesNotExist,
    ConceptNotQueryable,
    ConceptNotViewable,
    InvalidOperator,
    InvalidValueType,
    ContextDoesNotExist,
}

/// Node problems that leave the node enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKey {
    TooFewChildren,
    ValueNotAChoice,
    FieldNotNullable,
    InvalidChild,
    InvalidSort,
    ConceptNotSortable,
}

/// Structural failures of a document parse.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document is not shaped like a context or view at all.
    #[error("invalid document: {0}")]
    Input(String),

    /// A composite context refers back to one of its ancestors.
    #[error("composite context {0} refers to itself")]
    CompositeCycle(i64),

    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The catalog could not be read.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

pub type ParseResult<T> = Result<T, ParseError>;
