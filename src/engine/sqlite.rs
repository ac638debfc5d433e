//! SQLite engine.
//!
//! SQLite has no server process, so each connection gets a pseudo pid from
//! a counter. Cancel sets the connection's cancelled flag, which a progress
//! handler polls, and interrupts the running statement.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, InterruptHandle};
use tracing::debug;

use super::{Cursor, Engine, EngineConnection, EngineError, EngineResult};
use crate::sql::Dialect;
use crate::value::{Row, Value};

/// VM instructions between cancel checks.
const PROGRESS_INTERVAL: i32 = 1000;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

struct Interrupt {
    handle: InterruptHandle,
    cancelled: Arc<AtomicBool>,
}

/// File-backed SQLite engine.
pub struct SqliteEngine {
    path: PathBuf,
    next_pid: AtomicI64,
    live: Arc<DashMap<i64, Interrupt>>,
}

impl SqliteEngine {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            next_pid: AtomicI64::new(1),
            live: Arc::new(DashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Connections currently open.
    pub fn open_connections(&self) -> usize {
        self.live.len()
    }

    fn open(&self) -> EngineResult<SqliteConnection> {
        let conn = Connection::open(&self.path)
            .map_err(|e| EngineError::ConnectionFailed(e.to_string()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        conn.progress_handler(
            PROGRESS_INTERVAL,
            Some(move || flag.load(Ordering::SeqCst)),
        );
        self.live.insert(
            pid,
            Interrupt {
                handle: conn.get_interrupt_handle(),
                cancelled: Arc::clone(&cancelled),
            },
        );
        debug!(pid, path = %self.path.display(), "opened sqlite connection");

        Ok(SqliteConnection {
            conn,
            pid,
            cancelled,
            live: Arc::clone(&self.live),
        })
    }
}

impl std::fmt::Debug for SqliteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEngine")
            .field("path", &self.path)
            .field("open_connections", &self.live.len())
            .finish()
    }
}

impl Engine for SqliteEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn connect(&self) -> EngineResult<Box<dyn EngineConnection>> {
        Ok(Box::new(self.open()?))
    }

    fn cancel(&self, pid: i64) -> EngineResult<bool> {
        match self.live.get(&pid) {
            Some(entry) => {
                entry.cancelled.store(true, Ordering::SeqCst);
                entry.handle.interrupt();
                debug!(pid, "interrupted sqlite connection");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// A connection registered with its engine until dropped.
pub struct SqliteConnection {
    conn: Connection,
    pid: i64,
    cancelled: Arc<AtomicBool>,
    live: Arc<DashMap<i64, Interrupt>>,
}

impl SqliteConnection {
    fn check_cancelled(&self) -> EngineResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(EngineError::Interrupted);
        }
        Ok(())
    }

    fn run(&mut self, sql: &str) -> EngineResult<Cursor> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values: Row = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_sqlite(row.get_ref(i)?));
            }
            out.push(values);
        }
        Ok(Cursor::new(columns, out))
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        self.live.remove(&self.pid);
    }
}

impl EngineConnection for SqliteConnection {
    fn pid(&self) -> i64 {
        self.pid
    }

    fn query(&mut self, sql: &str) -> EngineResult<Cursor> {
        self.check_cancelled()?;
        debug!(pid = self.pid, sql, "executing query");
        self.run(sql).map_err(|e| self.classify(e))
    }

    fn execute(&mut self, sql: &str) -> EngineResult<usize> {
        self.check_cancelled()?;
        let affected = self
            .conn
            .execute_batch(sql)
            .map(|_| self.conn.changes() as usize)
            .map_err(EngineError::from);
        affected.map_err(|e| self.classify(e))
    }
}

impl SqliteConnection {
    /// Report any failure after a cancel as an interrupt.
    fn classify(&self, err: EngineError) -> EngineError {
        match &err {
            EngineError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::OperationInterrupted =>
            {
                EngineError::Interrupted
            }
            _ if self.cancelled.load(Ordering::SeqCst) => EngineError::Interrupted,
            _ => err,
        }
    }
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Int(n),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Text(String::from_utf8_lossy(b).into_owned()),
    }
}
