//! In-memory cache implementation

use crate::cache::traits::{CacheError, CacheResult, CacheStats, CacheStore};
use crate::cache::{CacheEntry, CacheKey};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// Process-local cache backend
///
/// Nothing survives the process. Used when `[cache] persist = false`, and in
/// tests, where `insert_entry` can plant entries with arbitrary timestamps.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully formed entry, replacing any previous one
    pub fn insert_entry(&self, entry: CacheEntry) -> CacheResult<()> {
        self.entries
            .write()
            .map_err(|_| CacheError::Poisoned)?
            .insert(entry.key.clone(), entry);
        Ok(())
    }

    /// Returns the stored entry regardless of freshness
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.read().ok()?.get(key).cloned()
    }
}

impl CacheStore for MemoryCache {
    fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.peek(key).filter(|e| e.is_fresh())
    }

    fn store(&self, key: &CacheKey, payload: &str, ttl: Duration) -> CacheResult<()> {
        self.insert_entry(CacheEntry {
            key: key.clone(),
            payload: payload.to_string(),
            recorded_at: Utc::now(),
            ttl,
        })
    }

    fn invalidate(&self, key: &CacheKey) -> CacheResult<bool> {
        Ok(self
            .entries
            .write()
            .map_err(|_| CacheError::Poisoned)?
            .remove(key)
            .is_some())
    }

    fn purge_expired(&self) -> CacheResult<usize> {
        let now = Utc::now();
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        let before = entries.len();
        entries.retain(|_, e| e.is_fresh_at(now));
        Ok(before - entries.len())
    }

    fn clear(&self) -> CacheResult<usize> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }

    fn stats(&self) -> CacheResult<CacheStats> {
        let now = Utc::now();
        let entries = self.entries.read().map_err(|_| CacheError::Poisoned)?;
        let fresh = entries.values().filter(|e| e.is_fresh_at(now)).count() as u64;
        let total = entries.len() as u64;
        Ok(CacheStats {
            total,
            fresh,
            expired: total - fresh,
        })
    }
}
