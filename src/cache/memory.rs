//! In-memory cache backend.

use dashmap::DashMap;

use super::{CacheBackend, CacheResult, CacheStats};

/// Concurrent in-process cache. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryCache {
    fn get_raw(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set_raw(&self, key: &str, value: String) -> CacheResult<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    fn delete_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let before = self.entries.len();
        self.entries.retain(|k, _| !k.starts_with(prefix));
        Ok(before - self.entries.len())
    }

    fn keys_with_prefix(&self, prefix: &str) -> CacheResult<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect())
    }

    fn clear_all(&self) -> CacheResult<()> {
        self.entries.clear();
        Ok(())
    }

    fn stats(&self) -> CacheResult<CacheStats> {
        Ok(CacheStats {
            entry_count: self.entries.len(),
            total_size_bytes: self.entries.iter().map(|e| e.value().len()).sum(),
        })
    }
}
