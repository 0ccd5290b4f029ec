use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Role given to a contributor that only appears in the splits list
pub const RIGHTS_HOLDER_ROLE: &str = "Rights holder";

/// A person credited on a track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
    pub role: String,
    /// Royalty share as shown by the catalog, e.g. "50%"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<String>,
}

/// One track of a collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRecord {
    /// 1-based position in extraction order
    pub track_number: u32,
    pub song_name: Option<String>,
    pub isrc: Option<String>,
    pub audio_file_name: Option<String>,
    #[serde(default)]
    pub contributors: Vec<Contributor>,
}

impl TrackRecord {
    pub fn new(track_number: u32) -> Self {
        Self {
            track_number,
            ..Self::default()
        }
    }

    /// True when at least one identifying field was found
    pub fn has_content(&self) -> bool {
        self.song_name.is_some() || self.isrc.is_some() || self.audio_file_name.is_some()
    }

    /// Records a contributor from the contributors list
    pub fn add_contributor(&mut self, name: impl Into<String>, role: impl Into<String>) {
        self.contributors.push(Contributor {
            name: name.into(),
            role: role.into(),
            split: None,
        });
    }

    /// Merges a share from the splits list into the contributor of that name
    ///
    /// A name not seen in the contributors list becomes a new rights holder.
    pub fn merge_split(&mut self, name: &str, split: impl Into<String>) {
        let split = split.into();
        match self.contributors.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.split = Some(split),
            None => self.contributors.push(Contributor {
                name: name.to_string(),
                role: RIGHTS_HOLDER_ROLE.to_string(),
                split: Some(split),
            }),
        }
    }
}

/// Duplicate-detection key for a track inside one collection
///
/// Missing fields collapse to placeholders so that partially extracted
/// tracks can still be compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackKey {
    song_name: String,
    isrc: String,
    position: usize,
}

impl TrackKey {
    pub fn new(track: &TrackRecord, position: usize) -> Self {
        Self {
            song_name: track
                .song_name
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            isrc: track.isrc.clone().unwrap_or_else(|| "no-isrc".to_string()),
            position,
        }
    }
}

/// Ordered tracks with composite-key de-duplication
#[derive(Debug, Default)]
pub struct TrackList {
    tracks: Vec<TrackRecord>,
    seen: HashSet<TrackKey>,
}

impl TrackList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a track found at `position`; returns false for a duplicate
    pub fn push(&mut self, track: TrackRecord, position: usize) -> bool {
        if !self.seen.insert(TrackKey::new(&track, position)) {
            return false;
        }
        self.tracks.push(track);
        true
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn into_vec(self) -> Vec<TrackRecord> {
        self.tracks
    }
}
