//! Relational engine seam.
//!
//! Avocado builds SQL; an [`Engine`] runs it. Engines hand out connections
//! that each carry a backend process id, and can abort the statement
//! running under a pid from outside that connection.
//!
//! - [`SqliteEngine`]: file-backed SQLite with interrupt-based cancel
//!
//! Servers with a real backend pid (PostgreSQL, MySQL) cancel through the
//! dialect's `cancel_statement`, issued from a fresh connection; see
//! [`Engine::cancel`].

mod sqlite;

pub use sqlite::SqliteEngine;

use std::collections::VecDeque;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{ConnectionConfig, Driver};
use crate::sql::{Dialect, SqlDialect};
use crate::value::Row;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by an engine or its connections.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The SQLite library reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The running statement was aborted through [`Engine::cancel`].
    #[error("query was interrupted")]
    Interrupted,

    /// Could not open a connection.
    #[error("database connection failed: {0}")]
    ConnectionFailed(String),

    /// No engine is available for this driver.
    #[error("no engine for driver: {0}")]
    Unsupported(String),
}

impl EngineError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Eagerly fetched result set.
///
/// Rows are pulled from the engine when the statement runs and handed out
/// in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cursor {
    columns: Vec<String>,
    rows: VecDeque<Row>,
}

impl Cursor {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }

    /// Column names of the result set.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows not yet consumed.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    pub fn fetch_all(self) -> Vec<Row> {
        self.rows.into()
    }
}

impl Iterator for Cursor {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.rows.len(), Some(self.rows.len()))
    }
}

/// One open connection to the engine.
pub trait EngineConnection: Send {
    /// Backend process id this connection runs under.
    fn pid(&self) -> i64;

    /// Run a statement returning rows.
    fn query(&mut self, sql: &str) -> EngineResult<Cursor>;

    /// Run a statement, returning the number of affected rows.
    fn execute(&mut self, sql: &str) -> EngineResult<usize>;
}

/// A relational engine.
pub trait Engine: Send + Sync {
    fn dialect(&self) -> Dialect;

    fn connect(&self) -> EngineResult<Box<dyn EngineConnection>>;

    /// Abort whatever is running under `pid`.
    ///
    /// Returns false when there was nothing to abort. The default issues the
    /// dialect's cancel statement from a separate connection.
    fn cancel(&self, pid: i64) -> EngineResult<bool> {
        let Some(sql) = self.dialect().cancel_statement(pid) else {
            return Ok(false);
        };
        let mut conn = self.connect()?;
        conn.execute(&sql)?;
        Ok(true)
    }
}

/// Open the engine for a resolved connection.
pub fn engine_for(config: &ConnectionConfig) -> EngineResult<Arc<dyn Engine>> {
    match config.driver {
        Driver::Sqlite => Ok(Arc::new(SqliteEngine::new(&config.connection_string))),
        other => Err(EngineError::Unsupported(other.as_str().to_string())),
    }
}
