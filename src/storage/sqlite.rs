//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::model::{CollectionRecord, ItemLink};
use crate::state::CrawlCounters;
use crate::storage::schema::{initialize_schema, SCHEMA_VERSION_KEY};
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::Progress;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const CURSOR_KEY: &str = "cursor";
const COMPLETE_KEY: &str = "complete";
const COUNTERS_KEY: &str = "counters";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl Storage for SqliteStorage {
    // ===== Discovered Links =====

    fn save_links(&mut self, links: &[ItemLink]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM discovered_links", [])?;
        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO discovered_links (position, url) VALUES (?1, ?2)")?;
            for (position, link) in links.iter().enumerate() {
                stmt.execute(params![position as i64, link.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_links(&self) -> StorageResult<Vec<ItemLink>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url FROM discovered_links ORDER BY position ASC")?;

        let links = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|url| url.map(ItemLink::from))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(links)
    }

    // ===== Records =====

    fn insert_record(&mut self, record: &CollectionRecord) -> StorageResult<bool> {
        let Some(id) = record.id.as_deref() else {
            return Ok(false);
        };
        let payload = serde_json::to_string(record)?;
        let now = Utc::now().to_rfc3339();

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO collections (id, position, source_url, payload, stored_at)
             VALUES (?1, (SELECT COALESCE(MAX(position), -1) + 1 FROM collections), ?2, ?3, ?4)",
            params![id, record.source_url, payload, now],
        )?;

        Ok(inserted == 1)
    }

    fn load_records(&self) -> StorageResult<Vec<CollectionRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload FROM collections ORDER BY position ASC")?;

        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        payloads
            .iter()
            .map(|payload| serde_json::from_str(payload).map_err(StorageError::from))
            .collect()
    }

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM collections", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Progress =====

    fn save_progress(&mut self, progress: &Progress) -> StorageResult<()> {
        let counters = serde_json::to_string(&progress.counters)?;
        let tx = self.conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT OR REPLACE INTO crawl_meta (key, value) VALUES (?1, ?2)")?;
            stmt.execute(params![CURSOR_KEY, progress.cursor.to_string()])?;
            stmt.execute(params![COMPLETE_KEY, progress.complete.to_string()])?;
            stmt.execute(params![COUNTERS_KEY, counters])?;
        }
        tx.commit()?;
        Ok(())
    }

    fn load_progress(&self) -> StorageResult<Option<Progress>> {
        let Some(cursor) = self.get_meta(CURSOR_KEY)? else {
            return Ok(None);
        };
        let cursor = cursor
            .parse::<usize>()
            .map_err(|_| StorageError::CorruptState(format!("cursor '{}'", cursor)))?;

        let complete = match self.get_meta(COMPLETE_KEY)?.as_deref() {
            Some("true") => true,
            Some("false") | None => false,
            Some(other) => {
                return Err(StorageError::CorruptState(format!("complete '{}'", other)))
            }
        };

        let counters = match self.get_meta(COUNTERS_KEY)? {
            Some(json) => serde_json::from_str::<CrawlCounters>(&json)?,
            None => CrawlCounters::default(),
        };

        Ok(Some(Progress {
            cursor,
            complete,
            counters,
        }))
    }

    // ===== Metadata =====

    fn get_meta(&self, key: &str) -> StorageResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM crawl_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_meta(&mut self, key: &str, value: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO crawl_meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn clear(&mut self) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM discovered_links", [])?;
        tx.execute("DELETE FROM collections", [])?;
        tx.execute(
            "DELETE FROM crawl_meta WHERE key != ?1",
            params![SCHEMA_VERSION_KEY],
        )?;
        tx.commit()?;
        Ok(())
    }
}
