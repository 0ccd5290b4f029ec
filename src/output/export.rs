//! JSON export of stored collections
//!
//! The export document carries a timestamp, totals and every stored record
//! in insertion order. `load_export` accepts any document with a
//! `collections` array, which is what the viewer checks before rendering.

use crate::model::CollectionRecord;
use crate::storage::Storage;
use crate::{HarvestError, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The exported document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    /// RFC 3339 time the export was written
    #[serde(default)]
    pub export_timestamp: String,
    #[serde(default)]
    pub total_collections: usize,
    #[serde(default)]
    pub total_tracks: usize,
    pub collections: Vec<CollectionRecord>,
}

impl ExportDocument {
    /// Builds a document stamped with the current time
    pub fn new(collections: Vec<CollectionRecord>) -> Self {
        let total_tracks = collections.iter().map(CollectionRecord::track_count).sum();
        Self {
            export_timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            total_collections: collections.len(),
            total_tracks,
            collections,
        }
    }
}

/// Writes every stored record to `path` as pretty-printed JSON
///
/// # Returns
///
/// * `Ok(ExportDocument)` - The document that was written
/// * `Err(HarvestError)` - Storage, serialization or file error
pub fn write_export<S: Storage + ?Sized>(storage: &S, path: &Path) -> Result<ExportDocument> {
    let document = ExportDocument::new(storage.load_records()?);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&document)?)?;

    tracing::info!(
        "Exported {} collections ({} tracks) to {}",
        document.total_collections,
        document.total_tracks,
        path.display()
    );
    Ok(document)
}

/// Reads an export document back
///
/// A document without a `collections` array is rejected.
pub fn load_export(path: &Path) -> Result<ExportDocument> {
    let content = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&content)?;

    if !value.get("collections").is_some_and(serde_json::Value::is_array) {
        return Err(HarvestError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{} is not an export: missing collections array", path.display()),
        )));
    }

    Ok(serde_json::from_value(value)?)
}
