use crate::model::{CollectionRecord, ItemLink};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Tallies of non-fatal crawl outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlCounters {
    /// Records stored
    pub extracted: u64,
    /// Records discarded because their id was already stored
    pub duplicates: u64,
    /// Item pages that produced no acceptable record
    pub failed: u64,
    /// Item pages reclaimed by the watchdog
    pub timed_out: u64,
    /// Item pages that could not be opened
    pub open_failures: u64,
}

/// Process-wide crawl state, owned and mutated by the orchestrator only
///
/// Links keep discovery order and are unique by URL. Records keep insertion
/// order and are unique by id.
#[derive(Debug, Clone, Default)]
pub struct CrawlState {
    links: Vec<ItemLink>,
    cursor: usize,
    records: Vec<CollectionRecord>,
    record_index: HashMap<String, usize>,
    complete: bool,
    counters: CrawlCounters,
}

impl CrawlState {
    /// Creates an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a state from persisted parts
    ///
    /// Duplicate links and records are dropped (first occurrence kept) and the
    /// cursor is clamped to the number of links.
    pub fn restore(
        links: Vec<ItemLink>,
        cursor: usize,
        records: Vec<CollectionRecord>,
        complete: bool,
        counters: CrawlCounters,
    ) -> Self {
        let mut state = Self::new();
        state.seed(links);
        state.cursor = cursor.min(state.links.len());
        for record in records {
            state.insert_record(record);
        }
        state.complete = complete;
        state.counters = counters;
        state
    }

    /// Clears links, cursor, records, counters and the completion flag
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Replaces the discovered links, keeping discovery order
    ///
    /// Returns the number of unique links kept.
    pub fn seed(&mut self, links: impl IntoIterator<Item = ItemLink>) -> usize {
        let mut seen = HashSet::new();
        self.links = links
            .into_iter()
            .filter(|link| seen.insert(link.clone()))
            .collect();
        self.cursor = 0;
        self.complete = false;
        self.links.len()
    }

    /// Takes the link under the cursor and moves the cursor past it
    pub fn advance(&mut self) -> Option<ItemLink> {
        let link = self.links.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(link)
    }

    /// The link most recently handed out by `advance`
    pub fn in_flight(&self) -> Option<&ItemLink> {
        self.cursor.checked_sub(1).and_then(|i| self.links.get(i))
    }

    /// Moves the cursor back by one so the in-flight link is visited again
    pub fn rewind(&mut self) {
        self.rewind_by(1);
    }

    /// Hands the last `count` items out again
    pub fn rewind_by(&mut self, count: usize) {
        self.cursor = self.cursor.saturating_sub(count);
        self.complete = false;
    }

    /// Stores a record unless its id is missing or already present
    ///
    /// Returns true if the record was inserted.
    pub fn insert_record(&mut self, record: CollectionRecord) -> bool {
        let Some(id) = record.id.clone() else {
            return false;
        };
        if self.record_index.contains_key(&id) {
            return false;
        }
        self.record_index.insert(id, self.records.len());
        self.records.push(record);
        true
    }

    pub fn contains_record(&self, id: &str) -> bool {
        self.record_index.contains_key(id)
    }

    pub fn record(&self, id: &str) -> Option<&CollectionRecord> {
        self.record_index.get(id).map(|&i| &self.records[i])
    }

    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// True when every link has been handed out
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.links.len()
    }

    pub fn links(&self) -> &[ItemLink] {
        &self.links
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn records(&self) -> &[CollectionRecord] {
        &self.records
    }

    pub fn total_tracks(&self) -> usize {
        self.records.iter().map(CollectionRecord::track_count).sum()
    }

    pub fn counters(&self) -> &CrawlCounters {
        &self.counters
    }

    pub fn counters_mut(&mut self) -> &mut CrawlCounters {
        &mut self.counters
    }
}
