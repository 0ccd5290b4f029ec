//! Database schema definitions
//!
//! This module contains the SQL schema for the harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Scalar crawl progress: cursor, completion flag, counters, config hash
CREATE TABLE IF NOT EXISTS crawl_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Item links in discovery order
CREATE TABLE IF NOT EXISTS discovered_links (
    position INTEGER PRIMARY KEY,
    url TEXT NOT NULL UNIQUE
);

-- Stored collection records, first-seen wins
CREATE TABLE IF NOT EXISTS collections (
    id TEXT PRIMARY KEY,
    position INTEGER NOT NULL,
    source_url TEXT NOT NULL,
    payload TEXT NOT NULL,
    stored_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_collections_position ON collections(position);
"#;

/// Key under which the schema version is recorded
pub const SCHEMA_VERSION_KEY: &str = "schema_version";

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
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO crawl_meta (key, value) VALUES (?1, ?2)",
        rusqlite::params![SCHEMA_VERSION_KEY, get_schema_version().to_string()],
    )?;
    Ok(())
}

/// Gets the current schema version
pub fn get_schema_version() -> u32 {
    1
}
