//! Configuration module for Release Harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use release_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Crawl starts at: {}", config.catalog.listing_url);
//! ```

mod parser;
mod selectors;
mod types;
mod validation;

// Re-export types
pub use selectors::{SelectorConfig, Strategy};
pub use types::{BrowserConfig, CatalogConfig, Config, CrawlerConfig, OutputConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
