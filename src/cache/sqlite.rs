//! SQLite cache implementation
//!
//! This module provides a SQLite-based implementation of the CacheStore trait.

use crate::cache::schema::initialize_schema;
use crate::cache::traits::{CacheError, CacheResult, CacheStats, CacheStore};
use crate::cache::{CacheEntry, CacheKey};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// SQLite cache backend
///
/// The connection sits behind a mutex so one store can be shared by every
/// concurrent funnel run. Each write is a single `INSERT OR REPLACE`, so a
/// reader never sees half an entry.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Opens or creates a cache database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteCache)` - Successfully opened/created database
    /// * `Err(CacheError)` - Failed to open database
    pub fn open(path: &Path) -> CacheResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory cache database
    pub fn open_in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> CacheResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }

    /// Reads every row as (key, decoded entry); undecodable rows come back as `None`
    fn all_rows(conn: &Connection) -> CacheResult<Vec<(String, Option<CacheEntry>)>> {
        let mut stmt =
            conn.prepare("SELECT key, payload, recorded_at, ttl_ms FROM cache_entries")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .map(|(key, payload, recorded_at, ttl_ms)| {
                let entry = decode_entry(&key, payload, &recorded_at, ttl_ms);
                (key, entry)
            })
            .collect())
    }
}

/// Builds an entry from stored columns
///
/// Returns `None` when the timestamp or TTL cannot be read.
fn decode_entry(key: &str, payload: String, recorded_at: &str, ttl_ms: i64) -> Option<CacheEntry> {
    let recorded_at = DateTime::parse_from_rfc3339(recorded_at)
        .ok()?
        .with_timezone(&Utc);
    let ttl = Duration::from_millis(u64::try_from(ttl_ms).ok()?);
    Some(CacheEntry {
        key: CacheKey::from_stored(key),
        payload,
        recorded_at,
        ttl,
    })
}

impl CacheStore for SqliteCache {
    fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        let conn = match self.conn() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Cache lookup for {} failed: {}", key, e);
                return None;
            }
        };

        let row = conn
            .query_row(
                "SELECT payload, recorded_at, ttl_ms FROM cache_entries WHERE key = ?1",
                params![key.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional();

        let (payload, recorded_at, ttl_ms) = match row {
            Ok(Some(row)) => row,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Cache lookup for {} failed: {}", key, e);
                return None;
            }
        };

        let Some(entry) = decode_entry(key.as_str(), payload, &recorded_at, ttl_ms) else {
            tracing::warn!("Unreadable cache entry {}, treating as miss", key);
            return None;
        };

        if !entry.is_fresh() {
            tracing::debug!("Cache entry {} expired", key);
            return None;
        }

        Some(entry)
    }

    fn store(&self, key: &CacheKey, payload: &str, ttl: Duration) -> CacheResult<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).map_err(|_| CacheError::InvalidTtl(ttl))?;
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        self.conn()?.execute(
            "INSERT OR REPLACE INTO cache_entries (key, payload, recorded_at, ttl_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![key.as_str(), payload, now, ttl_ms],
        )?;
        Ok(())
    }

    fn invalidate(&self, key: &CacheKey) -> CacheResult<bool> {
        let removed = self.conn()?.execute(
            "DELETE FROM cache_entries WHERE key = ?1",
            params![key.as_str()],
        )?;
        Ok(removed > 0)
    }

    fn purge_expired(&self) -> CacheResult<usize> {
        let conn = self.conn()?;
        let now = Utc::now();

        let stale: Vec<String> = Self::all_rows(&conn)?
            .into_iter()
            .filter(|(_, entry)| !entry.as_ref().is_some_and(|e| e.is_fresh_at(now)))
            .map(|(key, _)| key)
            .collect();

        let mut removed = 0;
        for key in &stale {
            removed += conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        }
        Ok(removed)
    }

    fn clear(&self) -> CacheResult<usize> {
        Ok(self.conn()?.execute("DELETE FROM cache_entries", [])?)
    }

    fn stats(&self) -> CacheResult<CacheStats> {
        let conn = self.conn()?;
        let now = Utc::now();

        let mut stats = CacheStats::default();
        for (_, entry) in Self::all_rows(&conn)? {
            stats.total += 1;
            if entry.is_some_and(|e| e.is_fresh_at(now)) {
                stats.fresh += 1;
            } else {
                stats.expired += 1;
            }
        }
        Ok(stats)
    }

    fn close(&self) -> CacheResult<()> {
        let purged = self.purge_expired()?;
        if purged > 0 {
            tracing::debug!("Purged {} expired cache entries", purged);
        }
        // No-op (reported as busy/unsupported) for in-memory databases
        let _ = self
            .conn()?
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
        Ok(())
    }
}
