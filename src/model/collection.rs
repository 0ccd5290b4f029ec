use crate::model::track::TrackRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Absolute URL of one catalog item, unique by exact string
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemLink(String);

impl ItemLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Collection id embedded in the link, if it has one
    pub fn collection_id(&self) -> Option<String> {
        collection_id_from_url(&self.0)
    }
}

impl fmt::Display for ItemLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ItemLink {
    fn from(url: String) -> Self {
        Self(url)
    }
}

impl From<&str> for ItemLink {
    fn from(url: &str) -> Self {
        Self(url.to_string())
    }
}

/// Extracts the numeric collection id from a `.../collection/<digits>` URL
pub fn collection_id_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("collection/")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// One release page's structured record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRecord {
    /// Collection id taken from the page URL; identity of the record
    pub id: Option<String>,
    pub upc: Option<String>,
    pub genre: Option<String>,
    pub release_id: Option<String>,
    pub release_date: Option<String>,
    /// Canonical cover art URL (size variant stripped)
    pub cover_art_url: Option<String>,
    pub cover_art_thumbnail: Option<String>,
    pub source_url: String,
    #[serde(default)]
    pub tracks: Vec<TrackRecord>,
}

impl CollectionRecord {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            ..Self::default()
        }
    }

    /// True when the record is complete enough to be stored
    ///
    /// An id is mandatory, plus either at least one track or a UPC.
    pub fn is_acceptable(&self) -> bool {
        self.id.is_some() && (!self.tracks.is_empty() || self.upc.is_some())
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}
