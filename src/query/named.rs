//! Cancellable named connections.
//!
//! A query run under a client-supplied name gets its own connection,
//! registered as `"_db:{name}"` with the backend pid it runs under. The
//! connection stays with the name and serves the next query under it;
//! distinct names never share one. Any other thread may cancel the running
//! query by name; the abort goes through the engine, never through the
//! running connection. A cancelled or failed connection is discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::pipeline::{PipelineError, PipelineResult};
use crate::engine::{Cursor, Engine, EngineConnection};
use crate::sql::Dialect;

/// Prefix of the connection alias for a named query.
pub const NAMED_ALIAS_PREFIX: &str = "_db:";

#[derive(Clone)]
struct NamedEntry {
    alias: String,
    pid: i64,
    conn: Arc<Mutex<Box<dyn EngineConnection>>>,
    running: Arc<AtomicBool>,
}

/// Process-wide table of named connections.
pub struct NamedConnections {
    engine: Arc<dyn Engine>,
    entries: DashMap<String, NamedEntry>,
}

impl std::fmt::Debug for NamedConnections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedConnections")
            .field("open", &self.entries.len())
            .finish()
    }
}

/// Marks the entry idle again when the query returns or unwinds.
struct Busy(Arc<AtomicBool>);

impl Drop for Busy {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl NamedConnections {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            entries: DashMap::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.engine.dialect()
    }

    /// Run `sql` on the connection registered under `name`, opening one
    /// when the name has none or its connection is busy.
    pub fn run(&self, name: &str, sql: &str) -> PipelineResult<Cursor> {
        let entry = self.checkout(name)?;
        let result = {
            let _busy = Busy(Arc::clone(&entry.running));
            entry.conn.lock().query(sql)
        };

        result.map_err(|err| {
            self.discard(name, entry.pid);
            if err.is_interrupted() {
                PipelineError::Cancelled(name.to_string())
            } else {
                err.into()
            }
        })
    }

    /// Claim the idle connection of `name`, or register a new one. The
    /// returned entry is marked running.
    fn checkout(&self, name: &str) -> PipelineResult<NamedEntry> {
        let existing = self.entries.get(name).map(|entry| entry.clone());
        if let Some(entry) = existing {
            if !entry.running.swap(true, Ordering::SeqCst) {
                debug!(name, pid = entry.pid, "reusing named connection");
                return Ok(entry);
            }
            debug!(name, pid = entry.pid, "named connection busy, opening another");
        }

        let conn = self.engine.connect()?;
        let entry = NamedEntry {
            alias: format!("{}{}", NAMED_ALIAS_PREFIX, name),
            pid: conn.pid(),
            conn: Arc::new(Mutex::new(conn)),
            running: Arc::new(AtomicBool::new(true)),
        };
        info!(name, alias = %entry.alias, pid = entry.pid, "opened named connection");
        self.entries.insert(name.to_string(), entry.clone());
        Ok(entry)
    }

    /// Drop the registration of `name` if it still points at `pid`.
    fn discard(&self, name: &str, pid: i64) {
        if self
            .entries
            .remove_if(name, |_, entry| entry.pid == pid)
            .is_some()
        {
            info!(name, pid, "closed named connection");
        }
    }

    /// Abort the query running under `name`. Returns false when nothing
    /// was running; calling it again is harmless. The aborted connection
    /// is not reused.
    pub fn cancel(&self, name: &str) -> PipelineResult<bool> {
        let Some((_, entry)) = self
            .entries
            .remove_if(name, |_, entry| entry.running.load(Ordering::SeqCst))
        else {
            debug!(name, "no named query to cancel");
            return Ok(false);
        };
        let cancelled = self.engine.cancel(entry.pid)?;
        info!(name, pid = entry.pid, cancelled, "cancelled named query");
        Ok(cancelled)
    }

    /// Close the idle connection of `name`. A running query keeps its
    /// connection until it returns.
    pub fn close(&self, name: &str) -> bool {
        let closed = self
            .entries
            .remove_if(name, |_, entry| !entry.running.load(Ordering::SeqCst))
            .is_some();
        if closed {
            info!(name, "closed named connection");
        }
        closed
    }

    /// Backend pid of the connection registered under `name`.
    pub fn pid(&self, name: &str) -> Option<i64> {
        self.entries.get(name).map(|entry| entry.pid)
    }

    /// Connection alias registered under `name`.
    pub fn alias(&self, name: &str) -> Option<String> {
        self.entries.get(name).map(|entry| entry.alias.clone())
    }

    /// Whether a query is executing under `name` right now.
    pub fn is_running(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|entry| entry.running.load(Ordering::SeqCst))
    }

    /// Registered connections, idle or running.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
