//! Release Harvester: a resilient catalog crawler
//!
//! This crate walks a paginated release catalog, visits every release page one
//! at a time, extracts a nested record (release metadata plus its tracks and
//! contributors) and persists the results incrementally so a long crawl
//! survives partial failures.

pub mod config;
pub mod crawler;
pub mod model;
pub mod output;
pub mod page;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Release Harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Page error: {0}")]
    Page(#[from] page::PageError),

    #[error("Listing page {url} could not be opened: {source}")]
    ListingUnavailable {
        url: String,
        source: page::PageError,
    },

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid extraction pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
}

/// Result type alias for Release Harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Extractor, LinkCrawler, Orchestrator, OrchestratorHandle};
pub use model::{CollectionRecord, Contributor, ItemLink, TrackRecord};
pub use state::{Ack, CrawlCounters, CrawlState, Step};
