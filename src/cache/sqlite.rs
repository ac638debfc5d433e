//! SQLite-backed cache.
//!
//! Stored at `<cache_dir>/avocado/cache.db` unless a path is configured.
//! The schema is versioned; a mismatch clears the cache on open.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::{CacheBackend, CacheResult, CacheStats};

/// Current cache schema version. Bump this when the cache format changes.
const CACHE_VERSION: i32 = 1;

pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Open or create the cache database at `path`.
    ///
    /// If the cache version doesn't match, it's automatically cleared.
    pub fn open(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let cache = Self {
            conn: Mutex::new(Connection::open(path)?),
        };
        cache.init()?;
        Ok(cache)
    }

    /// Open an in-memory cache (for testing).
    pub fn open_in_memory() -> CacheResult<Self> {
        let cache = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        cache.init()?;
        Ok(cache)
    }

    fn init(&self) -> CacheResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        let stored_version: Option<i32> = conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                let s: String = row.get(0)?;
                Ok(s.parse().unwrap_or(0))
            })
            .optional()?;

        if stored_version != Some(CACHE_VERSION) {
            if stored_version.is_some() {
                conn.execute("DELETE FROM cache", [])?;
            }
            conn.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?)",
                params![CACHE_VERSION.to_string()],
            )?;
        }

        Ok(())
    }
}

/// Escape LIKE wildcards so prefixes match literally.
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl CacheBackend for SqliteCache {
    fn get_raw(&self, key: &str) -> CacheResult<Option<String>> {
        let json = self
            .conn
            .lock()
            .query_row(
                "SELECT value FROM cache WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(json)
    }

    fn set_raw(&self, key: &str, value: String) -> CacheResult<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO cache (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<bool> {
        let rows = self
            .conn
            .lock()
            .execute("DELETE FROM cache WHERE key = ?", params![key])?;
        Ok(rows > 0)
    }

    fn delete_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let rows = self.conn.lock().execute(
            "DELETE FROM cache WHERE key LIKE ? ESCAPE '\\'",
            params![like_prefix(prefix)],
        )?;
        Ok(rows)
    }

    fn keys_with_prefix(&self, prefix: &str) -> CacheResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key FROM cache WHERE key LIKE ? ESCAPE '\\'")?;
        let keys = stmt
            .query_map(params![like_prefix(prefix)], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn clear_all(&self) -> CacheResult<()> {
        self.conn.lock().execute("DELETE FROM cache", [])?;
        Ok(())
    }

    fn stats(&self) -> CacheResult<CacheStats> {
        let conn = self.conn.lock();
        let entry_count: i64 = conn.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
        let total_size: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(value)), 0) FROM cache",
            [],
            |row| row.get(0),
        )?;

        Ok(CacheStats {
            entry_count: entry_count as usize,
            total_size_bytes: total_size as usize,
        })
    }
}
