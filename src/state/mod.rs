//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlState`: discovered links, cursor, stored records and completion flag
//! - `CrawlCounters`: tallies of every non-fatal outcome
//! - `Ack` / `Step`: what a delivered message or one crawl step resulted in

mod crawl_state;
mod outcome;

// Re-export main types
pub use crawl_state::{CrawlCounters, CrawlState};
pub use outcome::{Ack, Step};
