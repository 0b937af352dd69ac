//! Cache store trait and error types
//!
//! This module defines the trait interface for cache backends and
//! associated error types.

use crate::cache::{CacheEntry, CacheKey};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during cache operations
///
/// Only writes and maintenance surface these; reads downgrade every problem
/// to a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache lock poisoned")]
    Poisoned,

    #[error("TTL out of range: {0:?}")]
    InvalidTtl(Duration),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Entry counts reported by `CacheStore::stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total: u64,
    pub fresh: u64,
    pub expired: u64,
}

/// Trait for cache backends
///
/// Implementations are shared across concurrent funnel runs, so every method
/// takes `&self`. Calls are expected to be fast and never touch the network.
/// Concurrent writers to the same key must not tear an entry; the last
/// completed write wins.
pub trait CacheStore: Send + Sync {
    /// Looks up a fresh entry
    ///
    /// Returns `None` for missing, expired, corrupt or unreadable entries.
    fn lookup(&self, key: &CacheKey) -> Option<CacheEntry>;

    /// Writes an entry, replacing any previous entry for the key
    fn store(&self, key: &CacheKey, payload: &str, ttl: Duration) -> CacheResult<()>;

    /// Removes the entry for a key
    ///
    /// Returns true if an entry was removed.
    fn invalidate(&self, key: &CacheKey) -> CacheResult<bool>;

    /// Removes expired and unreadable entries, returning how many were removed
    fn purge_expired(&self) -> CacheResult<usize>;

    /// Removes every entry, returning how many were removed
    fn clear(&self) -> CacheResult<usize>;

    /// Counts entries by freshness
    fn stats(&self) -> CacheResult<CacheStats>;

    /// Ends a batch run's use of the store
    ///
    /// Backends may purge or checkpoint here. The store stays usable.
    fn close(&self) -> CacheResult<()> {
        Ok(())
    }
}
