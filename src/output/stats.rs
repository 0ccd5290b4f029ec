//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! crawl progress from the storage layer.

use crate::state::CrawlCounters;
use crate::storage::{load_crawl_state, Storage};
use crate::Result;

/// Crawl statistics summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlStatistics {
    /// Item links discovered on the listing
    pub links_discovered: usize,

    /// Items handed out so far
    pub cursor: usize,

    /// Records stored
    pub collections: usize,

    /// Tracks across all stored records
    pub tracks: usize,

    /// True when every link has been visited
    pub complete: bool,

    pub counters: CrawlCounters,
}

impl CrawlStatistics {
    /// Percentage of discovered links visited so far
    pub fn progress_percent(&self) -> f64 {
        if self.links_discovered == 0 {
            return 0.0;
        }
        (self.cursor as f64 / self.links_discovered as f64) * 100.0
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics<S: Storage + ?Sized>(storage: &S) -> Result<CrawlStatistics> {
    let state = load_crawl_state(storage)?;

    Ok(CrawlStatistics {
        links_discovered: state.links().len(),
        cursor: state.cursor(),
        collections: state.records().len(),
        tracks: state.total_tracks(),
        complete: state.is_complete(),
        counters: *state.counters(),
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Links discovered: {}", stats.links_discovered);
    println!(
        "  Items visited: {} ({:.1}%)",
        stats.cursor,
        stats.progress_percent()
    );
    println!("  Collections stored: {}", stats.collections);
    println!("  Tracks stored: {}", stats.tracks);
    println!(
        "  Status: {}",
        if stats.complete { "complete" } else { "in progress" }
    );
    println!();

    let counters = &stats.counters;
    println!("Outcomes:");
    println!("  Extracted: {}", counters.extracted);
    println!("  Duplicates skipped: {}", counters.duplicates);
    println!("  Failed extractions: {}", counters.failed);
    println!("  Timed out: {}", counters.timed_out);
    println!("  Could not open: {}", counters.open_failures);
}
