use crate::config::selectors::SelectorConfig;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Release Harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub selectors: SelectorConfig,
}

/// Where the crawl starts
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Listing page that holds the paginated release table
    #[serde(rename = "listing-url")]
    pub listing_url: String,
}

/// Crawl pacing and retry bounds (all durations in milliseconds)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Wait after opening the listing page before looking for the list view
    #[serde(rename = "listing-initial-delay")]
    pub listing_initial_delay: u64,

    /// Wait after the list-view tab was clicked
    #[serde(rename = "list-view-settle")]
    pub list_view_settle: u64,

    /// Wait when no list-view tab was found
    #[serde(rename = "list-view-fallback-settle")]
    pub list_view_fallback_settle: u64,

    /// Wait before scanning each listing page
    #[serde(rename = "page-settle")]
    pub page_settle: u64,

    /// Extra wait before re-scanning a first page that yielded nothing
    #[serde(rename = "empty-page-retry")]
    pub empty_page_retry: u64,

    /// Wait after advancing to the next listing page
    #[serde(rename = "pagination-settle")]
    pub pagination_settle: u64,

    /// Wait after opening an item page before extracting
    #[serde(rename = "item-settle")]
    pub item_settle: u64,

    /// Wait between extraction attempts on the same item page
    #[serde(rename = "extract-retry-delay")]
    pub extract_retry_delay: u64,

    /// Number of extraction attempts per item page
    #[serde(rename = "max-extract-attempts")]
    pub max_extract_attempts: u32,

    /// Time an item page gets to report a result before it is reclaimed
    #[serde(rename = "watchdog-timeout")]
    pub watchdog_timeout: u64,

    /// Delay before closing an item page after its record was stored
    #[serde(rename = "close-grace")]
    pub close_grace: u64,

    /// Delay between finishing one item and opening the next
    #[serde(rename = "next-item-delay")]
    pub next_item_delay: u64,

    /// Item pages in a row that may fail to open before the crawl halts
    #[serde(rename = "max-consecutive-open-failures")]
    pub max_consecutive_open_failures: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            listing_initial_delay: 2000,
            list_view_settle: 3000,
            list_view_fallback_settle: 1000,
            page_settle: 2000,
            empty_page_retry: 3000,
            pagination_settle: 3000,
            item_settle: 3000,
            extract_retry_delay: 2000,
            max_extract_attempts: 3,
            watchdog_timeout: 15000,
            close_grace: 500,
            next_item_delay: 2000,
            max_consecutive_open_failures: 3,
        }
    }
}

impl CrawlerConfig {
    /// A configuration with every delay set to zero (watchdog kept)
    pub fn immediate() -> Self {
        Self {
            listing_initial_delay: 0,
            list_view_settle: 0,
            list_view_fallback_settle: 0,
            page_settle: 0,
            empty_page_retry: 0,
            pagination_settle: 0,
            item_settle: 0,
            extract_retry_delay: 0,
            close_grace: 0,
            next_item_delay: 0,
            ..Self::default()
        }
    }

    pub fn watchdog(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout)
    }

    pub fn item_settle(&self) -> Duration {
        Duration::from_millis(self.item_settle)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace)
    }

    /// Time left to wait after the close grace before the next item opens
    pub fn next_item_delay(&self) -> Duration {
        Duration::from_millis(self.next_item_delay.saturating_sub(self.close_grace))
    }
}

/// Browser backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run the browser without a window
    pub headless: bool,

    /// Profile directory, reused so an authenticated session survives restarts
    #[serde(rename = "user-data-dir")]
    pub user_data_dir: Option<String>,

    /// Path to the Chrome/Chromium binary
    pub executable: Option<String>,

    /// DevTools websocket URL of an already running browser to attach to
    #[serde(rename = "debugger-url")]
    pub debugger_url: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            user_data_dir: None,
            executable: None,
            debugger_url: None,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database holding the crawl state
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory that receives downloaded cover art
    #[serde(rename = "covers-dir")]
    pub covers_dir: String,

    /// Default destination of `--export`
    #[serde(rename = "export-path")]
    pub export_path: String,
}
