//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::model::{CollectionRecord, ItemLink};
use crate::storage::Progress;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt crawl state: {0}")]
    CorruptState(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Persists the crawl state: discovered links, stored records and the
/// scalar progress (cursor, completion flag, counters).
pub trait Storage {
    // ===== Discovered Links =====

    /// Replaces the discovered links, keeping their order
    fn save_links(&mut self, links: &[ItemLink]) -> StorageResult<()>;

    /// Loads the discovered links in discovery order
    fn load_links(&self) -> StorageResult<Vec<ItemLink>>;

    // ===== Records =====

    /// Stores a record unless one with the same id exists
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The record was stored
    /// * `Ok(false)` - The id was already stored or the record has no id
    fn insert_record(&mut self, record: &CollectionRecord) -> StorageResult<bool>;

    /// Loads all records in insertion order
    fn load_records(&self) -> StorageResult<Vec<CollectionRecord>>;

    /// Counts the stored records
    fn count_records(&self) -> StorageResult<u64>;

    // ===== Progress =====

    /// Saves cursor, completion flag and counters
    fn save_progress(&mut self, progress: &Progress) -> StorageResult<()>;

    /// Loads the saved progress, if any was saved
    fn load_progress(&self) -> StorageResult<Option<Progress>>;

    // ===== Metadata =====

    fn get_meta(&self, key: &str) -> StorageResult<Option<String>>;

    fn set_meta(&mut self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes links, records, progress and metadata in one transaction
    fn clear(&mut self) -> StorageResult<()>;
}
