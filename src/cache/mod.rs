//! Cache store for accepted results
//!
//! This module handles persistence of previously accepted listing pages:
//! - Deterministic cache keys derived from fetch targets
//! - Time-bounded entries (expired entries read as absent)
//! - A durable SQLite backend and an in-memory backend
//! - Downgrading corrupt or unreadable entries to misses

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;
pub use traits::{CacheError, CacheResult, CacheStats, CacheStore};

use crate::model::FetchTarget;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Opens (or creates) the durable cache at `path`
///
/// Parent directories are created as needed.
pub fn open_cache(path: &Path) -> CacheResult<SqliteCache> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    SqliteCache::open(path)
}

/// Content-addressed key for one fetch target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for a target
    ///
    /// The key is the hex SHA-256 of the platform, normalized query, page and
    /// region, so two targets that differ only in query casing or spacing
    /// share an entry.
    pub fn for_target(target: &FetchTarget) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(target.platform.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(target.normalized_query().as_bytes());
        hasher.update(b"|");
        hasher.update(target.page.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(target.region.as_deref().unwrap_or("").as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps a key read back from storage
    pub fn from_stored(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored result
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,

    /// JSON array of accepted listings
    pub payload: String,

    /// When the entry was written
    pub recorded_at: DateTime<Utc>,

    /// How long the entry stays eligible for reuse
    pub ttl: Duration,
}

impl CacheEntry {
    /// Returns true while `now - recorded_at < ttl`
    ///
    /// An entry stamped in the future (clock skew) counts as age zero.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        let age = (now - self.recorded_at).to_std().unwrap_or(Duration::ZERO);
        age < self.ttl
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }
}
