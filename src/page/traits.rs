//! Page driver traits and error types

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

/// Errors that can occur while driving a page
#[derive(Debug, Error)]
pub enum PageError {
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("No element #{index} for selector '{selector}'")]
    ElementNotFound { selector: String, index: usize },

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Browser protocol error: {0}")]
    Protocol(String),

    #[error("Page is closed")]
    Closed,
}

impl PageError {
    /// True when the browser itself is unusable, not just one page
    pub fn is_fatal(&self) -> bool {
        matches!(self, PageError::Protocol(_) | PageError::Closed)
    }
}

/// Result type for page operations
pub type PageResult<T> = Result<T, PageError>;

/// Addresses one element of a rendered page
///
/// The element is the `index`-th (0-based, document order) element matching
/// `selector`. Targets are computed from a snapshot returned by
/// [`HostPage::content`], so they stay valid as long as the DOM has not changed
/// since that snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickTarget {
    pub selector: String,
    pub index: usize,
}

impl ClickTarget {
    /// Builds a target for `element` using its tag name as the selector
    pub fn locate(document: &Html, element: ElementRef<'_>) -> Option<Self> {
        let tag = element.value().name();
        let selector = Selector::parse(tag).ok()?;
        let index = document
            .select(&selector)
            .position(|candidate| candidate.id() == element.id())?;
        Some(Self {
            selector: tag.to_string(),
            index,
        })
    }
}

/// Selectors of known overlays
#[derive(Debug, Clone, Copy)]
pub struct OverlayTargets<'a> {
    /// Close buttons to click (consent dialogs)
    pub close: &'a str,
    /// Overlay regions to hide
    pub hide: &'a str,
}

/// A live, rendered page
#[async_trait]
pub trait HostPage: Send + Sync {
    /// Current location of the page
    async fn url(&self) -> PageResult<String>;

    /// The rendered DOM serialized as HTML
    async fn content(&self) -> PageResult<String>;

    /// Clicks the addressed element
    async fn click(&self, target: &ClickTarget) -> PageResult<()>;

    /// Clicks known close buttons and hides known overlay regions
    ///
    /// Returns how many elements were affected; zero is not an error.
    async fn dismiss_overlays(&self, overlays: OverlayTargets<'_>) -> PageResult<usize>;

    /// Closes the page; closing an already closed page is not an error
    async fn close(&self) -> PageResult<()>;
}

/// Opens pages
#[async_trait]
pub trait PageDriver: Send + Sync {
    type Page: HostPage + 'static;

    async fn open(&self, url: &str) -> PageResult<Self::Page>;
}
