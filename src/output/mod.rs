//! Output module for exports and progress reports
//!
//! This module handles:
//! - Exporting stored collections as a JSON document
//! - Loading and validating a previously exported document
//! - Recording crawl statistics for `--stats`

mod export;
pub mod stats;

pub use export::{load_export, write_export, ExportDocument};
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
