//! Listing page link discovery
//!
//! The crawler switches the listing to its list view, reads the pagination
//! label to learn how many pages there are, and walks them one by one,
//! collecting item links. Pagination failures end the walk early; the links
//! gathered so far are still returned.

use crate::config::CrawlerConfig;
use crate::crawler::html::{closest, parent_element, resolve_link};
use crate::crawler::strategy::{first_match, CompiledSelectors};
use crate::model::ItemLink;
use crate::page::{ClickTarget, HostPage, PageResult};
use scraper::{ElementRef, Html};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Pagination metadata read from the listing page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub first: i64,
    pub last: i64,
    pub total: i64,
}

impl Pagination {
    pub fn page_size(&self) -> i64 {
        self.last.saturating_sub(self.first).saturating_add(1)
    }

    /// Number of listing pages, at least one
    pub fn total_pages(&self) -> usize {
        let size = self.page_size();
        if size <= 0 || self.total <= 0 {
            return 1;
        }
        let pages = (self.total as u64).div_ceil(size as u64);
        usize::try_from(pages).unwrap_or(usize::MAX)
    }
}

/// Discovered links in discovery order, unique by URL
#[derive(Debug, Default)]
struct LinkSet {
    links: Vec<ItemLink>,
    seen: HashSet<String>,
}

impl LinkSet {
    fn insert(&mut self, url: String) -> bool {
        if !self.seen.insert(url.clone()) {
            return false;
        }
        self.links.push(ItemLink::new(url));
        true
    }

    fn len(&self) -> usize {
        self.links.len()
    }

    fn into_vec(self) -> Vec<ItemLink> {
        self.links
    }
}

/// Walks the paginated listing and collects item links
#[derive(Debug, Clone)]
pub struct LinkCrawler {
    selectors: Arc<CompiledSelectors>,
    pacing: CrawlerConfig,
}

impl LinkCrawler {
    pub fn new(selectors: Arc<CompiledSelectors>, pacing: CrawlerConfig) -> Self {
        Self { selectors, pacing }
    }

    /// Collects every item link of the listing
    ///
    /// Never fails: a page that cannot be read or paginated ends the walk and
    /// the links found up to that point are returned.
    ///
    /// # Arguments
    ///
    /// * `page` - The live listing page
    ///
    /// # Returns
    ///
    /// Unique item links in the order they were first seen
    pub async fn discover<P: HostPage + ?Sized>(&self, page: &P) -> Vec<ItemLink> {
        sleep_ms(self.pacing.listing_initial_delay).await;

        let tab_clicked = self.activate_list_view(page).await;
        sleep_ms(if tab_clicked {
            self.pacing.list_view_settle
        } else {
            self.pacing.list_view_fallback_settle
        })
        .await;

        let total_pages = match self.read_snapshot(page, |doc, _| self.pagination(doc)).await {
            Ok(Some(pagination)) => {
                tracing::info!(
                    "Pagination: showing {}-{} of {} ({} pages)",
                    pagination.first,
                    pagination.last,
                    pagination.total,
                    pagination.total_pages()
                );
                pagination.total_pages()
            }
            Ok(None) => {
                tracing::info!("No pagination label, assuming a single page");
                1
            }
            Err(e) => {
                tracing::warn!("Could not read listing page: {}", e);
                1
            }
        };

        let mut links = LinkSet::default();
        for current in 1..=total_pages {
            tracing::info!("Processing listing page {} of {}", current, total_pages);
            sleep_ms(self.pacing.page_settle).await;

            let rows = match self.scan(page, &mut links).await {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::warn!("Could not read listing page {}: {}", current, e);
                    break;
                }
            };

            if rows == 0 && current == 1 {
                tracing::info!("No rows on first page, retrying once");
                sleep_ms(self.pacing.empty_page_retry).await;
                if let Err(e) = self.scan(page, &mut links).await {
                    tracing::warn!("Retry scan failed: {}", e);
                }
            }

            if current < total_pages {
                if !self.next_page(page).await {
                    tracing::warn!(
                        "Failed to navigate past page {}, stopping pagination",
                        current
                    );
                    break;
                }
                sleep_ms(self.pacing.pagination_settle).await;
            }
        }

        tracing::info!("Found {} unique item links", links.len());
        links.into_vec()
    }

    /// Runs `read` on a fresh snapshot of the page
    ///
    /// The parsed document never outlives this call, so it is not held
    /// across an await.
    async fn read_snapshot<P, T>(
        &self,
        page: &P,
        read: impl FnOnce(&Html, Option<&Url>) -> T,
    ) -> PageResult<T>
    where
        P: HostPage + ?Sized,
    {
        let html = page.content().await?;
        let url = page.url().await?;
        let base = Url::parse(&url).ok();
        let document = Html::parse_document(&html);
        Ok(read(&document, base.as_ref()))
    }

    async fn activate_list_view<P: HostPage + ?Sized>(&self, page: &P) -> bool {
        let target = match self
            .read_snapshot(page, |doc, _| self.list_view_target(doc))
            .await
        {
            Ok(Some(target)) => target,
            Ok(None) => {
                tracing::info!("List view tab not found, using the default view");
                return false;
            }
            Err(e) => {
                tracing::warn!("Could not read listing page: {}", e);
                return false;
            }
        };

        match page.click(&target).await {
            Ok(()) => {
                tracing::info!("Switched to list view");
                true
            }
            Err(e) => {
                tracing::warn!("Clicking the list view tab failed: {}", e);
                false
            }
        }
    }

    /// Clickable element of the first matching list view strategy
    fn list_view_target(&self, document: &Html) -> Option<ClickTarget> {
        first_match(&self.selectors.list_view_tab, document, "list view tab", |tab| {
            let clickable = closest(tab, &self.selectors.tab_click_target).unwrap_or(tab);
            ClickTarget::locate(document, clickable)
        })
    }

    /// Reads `first`, `last` and `total` from the pagination label
    pub fn pagination(&self, document: &Html) -> Option<Pagination> {
        let label = document.select(&self.selectors.pagination_label).next()?;
        let number = |name: &str| -> i64 {
            label
                .value()
                .attr(name)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0)
        };
        Some(Pagination {
            first: number("first"),
            last: number("last"),
            total: number("total"),
        })
    }

    /// Scans the current page into `links`; returns the number of rows seen
    async fn scan<P: HostPage + ?Sized>(&self, page: &P, links: &mut LinkSet) -> PageResult<usize> {
        let hrefs = self
            .read_snapshot(page, |doc, base| self.row_links(doc, base))
            .await?;
        let rows = hrefs.len();
        let added = hrefs.into_iter().filter(|href| links.insert(href.clone())).count();
        tracing::debug!("Found {} rows ({} new links)", rows, added);
        Ok(rows)
    }

    /// Absolute item links of the listing rows, in row order
    pub fn row_links(&self, document: &Html, base: Option<&Url>) -> Vec<String> {
        let marker = self.selectors.item_link_marker.as_str();
        document
            .select(&self.selectors.listing_row)
            .filter_map(|row| row.value().attr("href"))
            .filter_map(|href| match base {
                Some(base) => resolve_link(href, base),
                None => Some(href.to_string()),
            })
            .filter(|href| href.contains(marker))
            .collect()
    }

    async fn next_page<P: HostPage + ?Sized>(&self, page: &P) -> bool {
        let target = match self
            .read_snapshot(page, |doc, _| self.next_page_target(doc))
            .await
        {
            Ok(Some(target)) => target,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!("Could not read listing page: {}", e);
                return false;
            }
        };

        match page.click(&target).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Clicking the next page button failed: {}", e);
                false
            }
        }
    }

    /// Locates the "next" button of the pagination control
    ///
    /// The control's second chevron is "next"; when that button is missing or
    /// disabled the last chevron's button is tried instead.
    pub fn next_page_target(&self, document: &Html) -> Option<ClickTarget> {
        let selectors = &self.selectors;
        let label = document.select(&selectors.pagination_label).next()?;
        let container = closest(label, &selectors.div).and_then(parent_element)?;
        let chevrons: Vec<ElementRef<'_>> = container.select(&selectors.pagination_chevron).collect();
        tracing::debug!("Found {} pagination chevrons", chevrons.len());

        let enabled = |button: &ElementRef<'_>| button.value().attr("disabled").is_none();
        let button = chevrons
            .get(1)
            .and_then(|chevron| closest(*chevron, &selectors.button))
            .filter(enabled)
            .or_else(|| {
                chevrons
                    .last()
                    .and_then(|chevron| closest(*chevron, &selectors.button))
                    .filter(enabled)
            });

        match button {
            Some(button) => ClickTarget::locate(document, button),
            None => {
                tracing::debug!("No enabled next button");
                None
            }
        }
    }
}

async fn sleep_ms(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
