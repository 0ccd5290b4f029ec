//! Storage module for persisting crawl state
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Discovered link persistence
//! - Collection record persistence with id uniqueness
//! - Cursor, completion and counter persistence for resumption

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::{CrawlCounters, CrawlState};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Metadata key holding the hash of the configuration a crawl started with
pub const CONFIG_HASH_KEY: &str = "config_hash";

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    SqliteStorage::new(path)
}

/// Scalar crawl progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub cursor: usize,
    pub complete: bool,
    pub counters: CrawlCounters,
}

impl Progress {
    pub fn of(state: &CrawlState) -> Self {
        Self {
            cursor: state.cursor(),
            complete: state.is_complete(),
            counters: *state.counters(),
        }
    }
}

/// Rebuilds the persisted crawl state
///
/// A database that never saved progress yields an empty state.
pub fn load_crawl_state<S: Storage + ?Sized>(storage: &S) -> StorageResult<CrawlState> {
    let links = storage.load_links()?;
    let records = storage.load_records()?;
    let progress = storage.load_progress()?.unwrap_or_default();

    if progress.cursor > links.len() {
        tracing::warn!(
            "Stored cursor {} is past the {} stored links, clamping",
            progress.cursor,
            links.len()
        );
    }

    Ok(CrawlState::restore(
        links,
        progress.cursor,
        records,
        progress.complete,
        progress.counters,
    ))
}
