//! Metadata cache.
//!
//! A process-wide key/value store holding serialized catalog records and
//! derived data (distinct values, value labels). Writers are the catalog
//! save/delete hooks; any lookup path may read.
//!
//! # Design
//!
//! - Simple key-value store with JSON values
//! - Pluggable backend: in-memory ([`MemoryCache`]) or SQLite ([`SqliteCache`])
//! - No TTL: entries live until deleted or the cache is cleared
//!
//! # Key Format
//!
//! ```text
//! {app}:{model}:{pk}                       -> serialized record
//! {app}:{model}:{pk}:{version}:{label}     -> derived data of that record
//! ```

mod hash;
mod memory;
mod sqlite;

pub use hash::{compute_hash, version_token};
pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use std::path::PathBuf;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::trace;

use crate::config::{CacheBackendKind, CacheSettings};

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to determine cache directory")]
    NoCacheDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries in the cache.
    pub entry_count: usize,
    /// Total size of all values in bytes.
    pub total_size_bytes: usize,
}

/// Storage behind a [`Cache`]. Values are opaque JSON strings.
pub trait CacheBackend: Send + Sync {
    fn get_raw(&self, key: &str) -> CacheResult<Option<String>>;

    fn set_raw(&self, key: &str, value: String) -> CacheResult<()>;

    /// Returns true if an entry was removed.
    fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Delete all entries whose key starts with `prefix`.
    fn delete_prefix(&self, prefix: &str) -> CacheResult<usize>;

    fn keys_with_prefix(&self, prefix: &str) -> CacheResult<Vec<String>>;

    fn clear_all(&self) -> CacheResult<()>;

    fn stats(&self) -> CacheResult<CacheStats>;
}

/// Typed handle over a shared backend. Cloning shares the backend.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").finish_non_exhaustive()
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::memory()
    }
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryCache::new()))
    }

    /// The backend selected in the `[cache]` settings.
    pub fn from_settings(settings: &CacheSettings) -> CacheResult<Self> {
        match settings.backend {
            CacheBackendKind::Memory => Ok(Self::memory()),
            CacheBackendKind::Sqlite => {
                let path = match &settings.path {
                    Some(path) => PathBuf::from(path),
                    None => default_cache_path()?,
                };
                Ok(Self::new(Arc::new(SqliteCache::open(path)?)))
            }
        }
    }

    /// Get a value from the cache.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.backend.get_raw(key)? {
            Some(s) => {
                trace!(key, "cache hit");
                Ok(Some(serde_json::from_str(&s)?))
            }
            None => {
                trace!(key, "cache miss");
                Ok(None)
            }
        }
    }

    /// Set a value in the cache.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> CacheResult<()> {
        let json = serde_json::to_string(value)?;
        self.backend.set_raw(key, json)
    }

    /// Return the cached value or compute, store and return it.
    pub fn get_or_insert_with<T, F, E>(&self, key: &str, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, E>,
        E: From<CacheError>,
    {
        if let Some(value) = self.get(key)? {
            return Ok(value);
        }
        let value = compute()?;
        self.set(key, &value)?;
        Ok(value)
    }

    pub fn delete(&self, key: &str) -> CacheResult<bool> {
        self.backend.delete(key)
    }

    pub fn delete_prefix(&self, prefix: &str) -> CacheResult<usize> {
        self.backend.delete_prefix(prefix)
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> CacheResult<Vec<String>> {
        self.backend.keys_with_prefix(prefix)
    }

    pub fn clear_all(&self) -> CacheResult<()> {
        self.backend.clear_all()
    }

    pub fn stats(&self) -> CacheResult<CacheStats> {
        self.backend.stats()
    }
}

/// Default location of the on-disk cache.
pub fn default_cache_path() -> CacheResult<PathBuf> {
    let base = dirs::cache_dir().ok_or(CacheError::NoCacheDir)?;
    Ok(base.join("avocado").join("cache.db"))
}

/// Helper for generating cache keys.
pub struct CacheKey;

impl CacheKey {
    /// Key for a cached record instance.
    pub fn instance(app: &str, model: &str, pk: i64) -> String {
        format!("{}:{}:{}", app, model, pk)
    }

    /// Key for data derived from a record, tagged with a version token so a
    /// changed record never serves stale data.
    pub fn derived(app: &str, model: &str, pk: i64, version: Option<&str>, label: &str) -> String {
        match version {
            Some(v) => format!("{}:{}:{}:{}:{}", app, model, pk, v, label),
            None => format!("{}:{}:{}:{}", app, model, pk, label),
        }
    }

    /// Prefix covering a record and everything derived from it.
    pub fn instance_prefix(app: &str, model: &str, pk: i64) -> String {
        format!("{}:{}:{}:", app, model, pk)
    }
}
