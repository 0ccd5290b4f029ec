//! Field-level extraction from item page snapshots
//!
//! Structured lookups go through the compiled selector table; text patterns
//! are the fallback when the catalog's markup does not label a value.

use crate::crawler::html::{closest, element_text, next_element_sibling, parent_element, visible_text};
use crate::crawler::strategy::CompiledSelectors;
use crate::model::TrackRecord;
use regex::Regex;
use scraper::ElementRef;

/// Text patterns for labelled values
#[derive(Debug)]
pub struct FieldPatterns {
    upc: Regex,
    genre: Regex,
    release_id: Regex,
    release_date: Regex,
    isrc: Regex,
    track_prefix: Regex,
    size_suffix: Regex,
}

impl FieldPatterns {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            upc: Regex::new(r"(?i)UPC[:\s]+(\d{12,13})")?,
            genre: Regex::new(r"(?i)Genre[:\s]+([^\n]+)")?,
            release_id: Regex::new(r"(?i)Release ID[:\s]+(\w+)")?,
            release_date: Regex::new(r"(?i)Release Date[:\s]+([^\n]+)")?,
            // Country code, registrant, year, designation
            isrc: Regex::new(r"(?i)ISRC[:\s]+([A-Z]{2}[A-Z0-9]{3}\d{2}\d{5})")?,
            track_prefix: Regex::new(r"^(\d{1,2})\s*(.+)$")?,
            size_suffix: Regex::new(r"\.\d+x\d+")?,
        })
    }

    fn capture(pattern: &Regex, text: &str) -> Option<String> {
        pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|value| !value.is_empty())
    }

    pub fn upc(&self, text: &str) -> Option<String> {
        Self::capture(&self.upc, text)
    }

    pub fn genre(&self, text: &str) -> Option<String> {
        Self::capture(&self.genre, text)
    }

    pub fn release_id(&self, text: &str) -> Option<String> {
        Self::capture(&self.release_id, text)
    }

    pub fn release_date(&self, text: &str) -> Option<String> {
        Self::capture(&self.release_date, text)
    }

    pub fn isrc(&self, text: &str) -> Option<String> {
        Self::capture(&self.isrc, text)
    }

    /// Removes a leading one or two digit track number ("01 Intro" -> "Intro")
    pub fn strip_track_prefix(&self, name: &str) -> String {
        match self.track_prefix.captures(name) {
            Some(caps) => {
                tracing::trace!("Removed track number {:?} from {:?}", &caps[1], name);
                caps[2].to_string()
            }
            None => name.to_string(),
        }
    }

    /// Drops the first `.WxH` size variant from an image URL
    pub fn canonical_cover_url(&self, src: &str) -> String {
        self.size_suffix.replacen(src, 1, "").into_owned()
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Reads the ISRC next to its label inside `scope`
///
/// The value is the label's light-weight sibling, else the label's next
/// element, else (with `allow_bare`) any unlabelled span next to it.
pub fn labelled_isrc(
    selectors: &CompiledSelectors,
    scope: ElementRef<'_>,
    allow_bare: bool,
) -> Option<String> {
    let label = scope.select(&selectors.isrc_label).next()?;
    let parent = parent_element(label);

    let value = parent
        .and_then(|p| p.select(&selectors.label_value).next())
        .or_else(|| next_element_sibling(label))
        .or_else(|| {
            if allow_bare {
                parent.and_then(|p| p.select(&selectors.bare_value).next())
            } else {
                None
            }
        })?;

    non_empty(element_text(value))
}

/// ISRC from its label, falling back to a text pattern over `scope`
pub fn isrc(
    selectors: &CompiledSelectors,
    patterns: &FieldPatterns,
    scope: ElementRef<'_>,
    allow_bare: bool,
) -> Option<String> {
    labelled_isrc(selectors, scope, allow_bare).or_else(|| {
        let found = patterns.isrc(&visible_text(scope));
        if found.is_some() {
            tracing::debug!("ISRC found by text pattern");
        }
        found
    })
}

/// Audio file name next to its label
pub fn audio_file_name(selectors: &CompiledSelectors, scope: ElementRef<'_>) -> Option<String> {
    let label = scope.select(&selectors.audio_file_label).next()?;
    let value = parent_element(label)?
        .select(&selectors.label_value)
        .next()?;
    non_empty(element_text(value))
}

/// List rows belonging to a section label: the label's enclosing div's parent
fn section_rows<'a>(
    selectors: &CompiledSelectors,
    label: ElementRef<'a>,
) -> Vec<ElementRef<'a>> {
    closest(label, &selectors.div)
        .and_then(parent_element)
        .map(|section| section.select(&selectors.list_rows).collect())
        .unwrap_or_default()
}

/// Fills a track's contributors from the contributors and splits lists
///
/// Contributors come first (name and role); splits are merged in by name.
pub fn contributors(selectors: &CompiledSelectors, scope: ElementRef<'_>, track: &mut TrackRecord) {
    if let Some(label) = scope.select(&selectors.contributors_label).next() {
        for row in section_rows(selectors, label) {
            let name = row.select(&selectors.contributor_name).next();
            let role = row.select(&selectors.contributor_role).next();
            if let (Some(name), Some(role)) = (name, role) {
                track.add_contributor(element_text(name), element_text(role));
            }
        }
    }

    if let Some(label) = scope.select(&selectors.splits_label).next() {
        for row in section_rows(selectors, label) {
            let name = row.select(&selectors.contributor_name).next();
            let share = row.select(&selectors.split_share).next().map(element_text);
            if let (Some(name), Some(share)) = (name, share) {
                if share.contains('%') {
                    track.merge_split(&element_text(name), share);
                }
            }
        }
    }
}
