//! Cache database schema

/// SQL schema for the cache database
pub const SCHEMA_SQL: &str = r#"
-- One row per fetch target; rows are replaced wholesale on write
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    ttl_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_recorded ON cache_entries(recorded_at);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    if has_legacy_ttl_column(conn)? {
        // Entries are disposable; rebuild rather than convert
        tracing::info!("Cache table uses second-based TTLs, recreating it");
        conn.execute_batch("DROP TABLE cache_entries;")?;
    }
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// True when an existing `cache_entries` table predates millisecond TTLs
fn has_legacy_ttl_column(conn: &rusqlite::Connection) -> Result<bool, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('cache_entries')")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns.iter().any(|c| c == "ttl_secs"))
}
