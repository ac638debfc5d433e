//! Context and view composed into one query, executed and exported.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::{NamedConnections, ParseError, ParsedContext, ParsedView, QuerySet};
use crate::engine::{Cursor, Engine, EngineError};
use crate::export::{Codes, Export, Exporter};
use crate::format::{Formatter, FormatterRegistry};
use crate::graph::{GraphError, GraphResult, JoinTree};
use crate::sql::Dialect;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Aborted through [`NamedConnections::cancel`].
    #[error("Query '{0}' was cancelled")]
    Cancelled(String),

    #[error("Invalid request: {0}")]
    Input(String),

    #[error(transparent)]
    Execution(#[from] EngineError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Runs compiled SQL, on a named connection when the caller names the
/// query.
pub struct Executor {
    engine: Arc<dyn Engine>,
    named: NamedConnections,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("dialect", &self.engine.dialect())
            .field("named", &self.named)
            .finish()
    }
}

impl Executor {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            named: NamedConnections::new(engine.clone()),
            engine,
        }
    }

    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    pub fn named(&self) -> &NamedConnections {
        &self.named
    }

    pub fn dialect(&self) -> Dialect {
        self.engine.dialect()
    }

    pub fn query(&self, sql: &str, name: Option<&str>) -> PipelineResult<Cursor> {
        match name {
            Some(name) => self.named.run(name, sql),
            None => {
                let mut conn = self.engine.connect()?;
                Ok(conn.query(sql)?)
            }
        }
    }

    /// Cancel the named query, if it is running.
    pub fn cancel(&self, name: &str) -> PipelineResult<bool> {
        self.named.cancel(name)
    }
}

/// One request: optional context and view over a root table.
#[derive(Debug, Clone)]
pub struct QueryProcessor {
    tree: Arc<JoinTree>,
    context: Option<ParsedContext>,
    view: Option<ParsedView>,
    include_pk: bool,
}

impl QueryProcessor {
    pub fn new(tree: Arc<JoinTree>) -> Self {
        Self {
            tree,
            context: None,
            view: None,
            include_pk: true,
        }
    }

    pub fn context(mut self, context: ParsedContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn view(mut self, view: ParsedView) -> Self {
        self.view = Some(view);
        self
    }

    pub fn include_pk(mut self, include_pk: bool) -> Self {
        self.include_pk = include_pk;
        self
    }

    pub fn tree(&self) -> &JoinTree {
        &self.tree
    }

    pub fn parsed_view(&self) -> Option<&ParsedView> {
        self.view.as_ref()
    }

    pub fn has_hidden(&self) -> bool {
        self.view.as_ref().is_some_and(ParsedView::has_hidden)
    }

    /// All rows of the root table, filtered by the context and projected
    /// and ordered by the view.
    pub fn get_queryset(&self) -> GraphResult<QuerySet> {
        let mut qs = QuerySet::new(self.tree.clone());
        if let Some(context) = &self.context {
            qs = context.apply(qs);
        }
        if let Some(view) = &self.view {
            qs = view.apply(qs, self.include_pk)?;
        }
        Ok(qs)
    }

    /// SQL of the sliced queryset.
    pub fn sql(&self, dialect: Dialect, offset: Option<u64>, limit: Option<u64>) -> GraphResult<String> {
        self.get_queryset()?.slice(offset, limit).to_sql(dialect)
    }

    /// Execute and return the raw rows.
    pub fn get_iterable(
        &self,
        executor: &Executor,
        offset: Option<u64>,
        limit: Option<u64>,
        name: Option<&str>,
    ) -> PipelineResult<Cursor> {
        let sql = self.sql(executor.dialect(), offset, limit)?;
        debug!(name, "executing query");
        executor.query(&sql, name)
    }

    /// An export of this request's view. The primary key leads every row
    /// when `include_pk` is set.
    pub fn get_exporter(
        &self,
        exporter: Arc<dyn Exporter>,
        formats: &FormatterRegistry,
        codes: &Codes,
    ) -> Export {
        let view = self.view.clone().unwrap_or_default();
        let mut export = Export::new(exporter, &view, formats, codes);
        if self.include_pk {
            export.prepend(Formatter::raw(self.tree.root_pk()));
        }
        export
    }
}
