//! Integration tests for the crawler
//!
//! These tests drive the orchestrator against a scripted page driver that
//! serves canned listing and item pages, and test the full crawl cycle
//! end-to-end with a real SQLite database.

use async_trait::async_trait;
use release_harvester::config::{
    BrowserConfig, CatalogConfig, Config, CrawlerConfig, OutputConfig, SelectorConfig,
};
use release_harvester::crawler::{CoverDownloader, Message, Orchestrator, Ticket};
use release_harvester::model::{CollectionRecord, ItemLink, TrackRecord};
use release_harvester::output::{load_export, write_export};
use release_harvester::page::{ClickTarget, HostPage, OverlayTargets, PageDriver, PageError, PageResult};
use release_harvester::state::{Ack, Step};
use release_harvester::storage::{Progress, SqliteStorage, Storage};
use release_harvester::HarvestError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING_URL: &str = "https://artist.amuse.io/studio/releases";

fn item_url(id: u32) -> String {
    format!("https://artist.amuse.io/studio/collection/{}", id)
}

/// How an item URL behaves when opened
enum ItemPage {
    Html(String),
    /// Opens, but never finishes rendering
    Hang,
    /// Cannot be opened
    Unreachable,
    /// Navigation never finishes
    StallOpen,
    /// The browser connection dropped
    BrowserGone,
}

/// Canned site shared by the driver and its pages
#[derive(Default)]
struct Site {
    /// Listing views in pagination order
    listing: Vec<String>,
    /// Served instead of the listing for the first `loading_reads` reads
    loading_view: Option<String>,
    loading_reads: usize,
    listing_reads: AtomicUsize,
    items: HashMap<String, ItemPage>,
    open_pages: AtomicUsize,
    max_open_pages: AtomicUsize,
    opened: Mutex<Vec<String>>,
}

impl Site {
    fn with_item(mut self, id: u32, page: ItemPage) -> Self {
        self.items.insert(item_url(id), page);
        self
    }

    fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

struct FakeDriver {
    site: Arc<Site>,
}

#[async_trait]
impl PageDriver for FakeDriver {
    type Page = FakePage;

    async fn open(&self, url: &str) -> PageResult<FakePage> {
        let (views, hang) = if url == LISTING_URL && !self.site.listing.is_empty() {
            (self.site.listing.clone(), false)
        } else {
            match self.site.items.get(url) {
                Some(ItemPage::Html(html)) => (vec![html.clone()], false),
                Some(ItemPage::Hang) => (vec![String::new()], true),
                Some(ItemPage::StallOpen) => std::future::pending().await,
                Some(ItemPage::BrowserGone) => {
                    return Err(PageError::Protocol("websocket closed".to_string()))
                }
                Some(ItemPage::Unreachable) | None => {
                    return Err(PageError::Navigation {
                        url: url.to_string(),
                        message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
                    })
                }
            }
        };

        self.site.opened.lock().unwrap().push(url.to_string());
        let now_open = self.site.open_pages.fetch_add(1, Ordering::SeqCst) + 1;
        self.site.max_open_pages.fetch_max(now_open, Ordering::SeqCst);

        Ok(FakePage {
            url: url.to_string(),
            views,
            view: Mutex::new(0),
            hang,
            closed: AtomicBool::new(false),
            site: Arc::clone(&self.site),
        })
    }
}

struct FakePage {
    url: String,
    views: Vec<String>,
    view: Mutex<usize>,
    hang: bool,
    closed: AtomicBool,
    site: Arc<Site>,
}

#[async_trait]
impl HostPage for FakePage {
    async fn url(&self) -> PageResult<String> {
        Ok(self.url.clone())
    }

    async fn content(&self) -> PageResult<String> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.url == LISTING_URL {
            let reads = self.site.listing_reads.fetch_add(1, Ordering::SeqCst);
            if let Some(loading) = &self.site.loading_view {
                if reads < self.site.loading_reads {
                    return Ok(loading.clone());
                }
            }
        }
        let view = *self.view.lock().unwrap();
        Ok(self.views[view].clone())
    }

    async fn click(&self, target: &ClickTarget) -> PageResult<()> {
        // The listing's second button is "next page"
        if target.selector == "button" && target.index == 1 {
            let mut view = self.view.lock().unwrap();
            if *view + 1 < self.views.len() {
                *view += 1;
            }
        }
        Ok(())
    }

    async fn dismiss_overlays(&self, _overlays: OverlayTargets<'_>) -> PageResult<usize> {
        Ok(0)
    }

    async fn close(&self) -> PageResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.site.open_pages.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// One listing view with a pagination label and the given collection ids
fn listing_view(first: u32, last: u32, total: u32, ids: &[u32]) -> String {
    let rows: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<a data-testid="data_table_row" href="/studio/collection/{id}">Release {id}</a>"#
            )
        })
        .collect();
    format!(
        r#"<html><body>
            <div class="pager">
              <div><span data-path="pagination_lbl" first="{first}" last="{last}" total="{total}">{first}-{last} of {total}</span></div>
              <button><svg><path d="M5.29016 1z"></path></svg></button>
              <button><svg><path d="M5.29016 2z"></path></svg></button>
            </div>
            {rows}
        </body></html>"#
    )
}

/// Disables a listing view's "next" button
fn next_disabled(view: String) -> String {
    let at = view.rfind("<button>").unwrap();
    let mut view = view;
    view.replace_range(at..at + "<button>".len(), "<button disabled>");
    view
}

/// An item page with one track container per name
fn item_html(upc: Option<&str>, tracks: &[(&str, &str)]) -> String {
    let containers: String = tracks
        .iter()
        .map(|(name, isrc)| {
            format!(
                r#"<div class="bg-surface-3 mb-6">
                    <h4><span class="name">{name}</span></h4>
                    <div><span data-path="core_lbl_isrc_text">ISRC</span><span class="font-light">{isrc}</span></div>
                </div>"#
            )
        })
        .collect();
    let upc = upc.map(|u| format!("<div>UPC: {u}</div>")).unwrap_or_default();
    format!(r#"<html><body><div id="__nuxt">{upc}{containers}</div></body></html>"#)
}

fn simple_item(n: u32) -> ItemPage {
    let name = format!("Song {n}");
    let isrc = format!("USABC24{n:05}");
    ItemPage::Html(item_html(None, &[(name.as_str(), isrc.as_str())]))
}

/// Creates a test configuration with no pacing delays
fn create_test_config(dir: &Path) -> Config {
    Config {
        catalog: CatalogConfig {
            listing_url: LISTING_URL.to_string(),
        },
        crawler: CrawlerConfig::immediate(),
        browser: BrowserConfig::default(),
        output: OutputConfig {
            database_path: dir.join("harvest.db").to_string_lossy().into_owned(),
            covers_dir: dir.join("covers").to_string_lossy().into_owned(),
            export_path: dir.join("collections.json").to_string_lossy().into_owned(),
        },
        selectors: SelectorConfig::default(),
    }
}

fn orchestrator(site: Site, dir: &Path) -> (Orchestrator<FakeDriver, SqliteStorage>, Arc<Site>) {
    orchestrator_with(site, dir, |_| {})
}

fn orchestrator_with(
    site: Site,
    dir: &Path,
    tweak: impl FnOnce(&mut Config),
) -> (Orchestrator<FakeDriver, SqliteStorage>, Arc<Site>) {
    let mut config = create_test_config(dir);
    tweak(&mut config);
    let storage = SqliteStorage::new(Path::new(&config.output.database_path)).unwrap();
    let site = Arc::new(site);
    let driver = FakeDriver {
        site: Arc::clone(&site),
    };
    (Orchestrator::new(driver, storage, &config).unwrap(), site)
}

fn links(ids: &[u32]) -> Vec<ItemLink> {
    ids.iter().map(|id| ItemLink::new(item_url(*id))).collect()
}

fn record(id: u32) -> CollectionRecord {
    let mut record = CollectionRecord::new(item_url(id));
    record.id = Some(id.to_string());
    record.tracks = vec![TrackRecord::new(1)];
    record
}

#[tokio::test(start_paused = true)]
async fn test_full_crawl_over_paginated_listing() {
    let dir = TempDir::new().unwrap();
    let mut site = Site {
        listing: vec![
            listing_view(1, 10, 25, &[1, 2, 3]),
            // Page two re-renders a row of page one
            listing_view(11, 20, 25, &[3, 4, 5]),
            listing_view(21, 25, 25, &[6]),
        ],
        ..Site::default()
    };
    for id in 1..=6 {
        site = site.with_item(id, simple_item(id));
    }
    let (mut orchestrator, site) = orchestrator(site, dir.path());

    let count = orchestrator.start(LISTING_URL).await.unwrap();
    assert_eq!(count, 6);

    let summary = orchestrator.run().await.unwrap();
    assert!(summary.complete);
    assert!(!summary.cancelled);
    assert_eq!(summary.links, 6);
    assert_eq!(summary.visited, 6);
    assert_eq!(summary.stored, 6);
    assert_eq!(summary.tracks, 6);
    assert_eq!(summary.counters.extracted, 6);

    // Items are visited in discovery order, one page at a time
    let expected: Vec<String> = std::iter::once(LISTING_URL.to_string())
        .chain((1..=6).map(item_url))
        .collect();
    assert_eq!(site.opened(), expected);
    assert_eq!(site.max_open_pages.load(Ordering::SeqCst), 1);
    assert_eq!(site.open_pages.load(Ordering::SeqCst), 0);

    // Everything survived in storage
    let storage = orchestrator.storage();
    assert_eq!(storage.load_links().unwrap().len(), 6);
    let ids: Vec<_> = storage
        .load_records()
        .unwrap()
        .into_iter()
        .filter_map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5", "6"]);
    let progress = storage.load_progress().unwrap().unwrap();
    assert!(progress.complete);
    assert_eq!(progress.cursor, 6);
}

#[tokio::test(start_paused = true)]
async fn test_export_after_crawl() {
    let dir = TempDir::new().unwrap();
    let site = Site {
        listing: vec![listing_view(1, 2, 2, &[1, 2])],
        ..Site::default()
    }
    .with_item(1, simple_item(1))
    .with_item(
        2,
        ItemPage::Html(item_html(
            Some("123456789012"),
            &[("01 Intro", "USABC2400010"), ("02 Outro", "USABC2400011")],
        )),
    );
    let (mut orchestrator, _site) = orchestrator(site, dir.path());

    orchestrator.start(LISTING_URL).await.unwrap();
    orchestrator.run().await.unwrap();

    let path = dir.path().join("collections.json");
    write_export(orchestrator.storage(), &path).unwrap();
    let document = load_export(&path).unwrap();

    assert_eq!(document.total_collections, 2);
    assert_eq!(document.total_tracks, 3);
    let second = &document.collections[1];
    assert_eq!(second.upc.as_deref(), Some("123456789012"));
    let names: Vec<_> = second
        .tracks
        .iter()
        .map(|t| (t.track_number, t.song_name.clone().unwrap_or_default()))
        .collect();
    assert_eq!(names, vec![(1, "Intro".to_string()), (2, "Outro".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_listing_without_pagination_is_one_page() {
    let dir = TempDir::new().unwrap();
    let listing = r#"<html><body>
        <a data-testid="data_table_row" href="/studio/collection/8">A</a>
        <a data-testid="data_table_row" href="/studio/collection/9">B</a>
    </body></html>"#;
    let site = Site {
        listing: vec![listing.to_string()],
        ..Site::default()
    };
    let (mut orchestrator, _site) = orchestrator(site, dir.path());

    assert_eq!(orchestrator.start(LISTING_URL).await.unwrap(), 2);
    assert_eq!(orchestrator.state().links(), links(&[8, 9]).as_slice());
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_listing_is_fatal() {
    let dir = TempDir::new().unwrap();
    let (mut orchestrator, _site) = orchestrator(Site::default(), dir.path());

    let result = orchestrator.start(LISTING_URL).await;
    assert!(matches!(result, Err(HarvestError::ListingUnavailable { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_empty_first_page_is_scanned_again() {
    let dir = TempDir::new().unwrap();
    let site = Site {
        listing: vec![listing_view(1, 3, 3, &[1, 2, 3])],
        // Rows render after the pagination label
        loading_view: Some(listing_view(1, 3, 3, &[])),
        loading_reads: 3,
        ..Site::default()
    };
    let (mut orchestrator, site) = orchestrator_with(site, dir.path(), |config| {
        config.crawler.empty_page_retry = 3_000;
    });

    let started = tokio::time::Instant::now();
    assert_eq!(orchestrator.start(LISTING_URL).await.unwrap(), 3);
    assert!(started.elapsed() >= Duration::from_millis(3_000));
    assert_eq!(orchestrator.state().links(), links(&[1, 2, 3]).as_slice());
    assert_eq!(site.listing_reads.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_next_button_keeps_links_found_so_far() {
    let dir = TempDir::new().unwrap();
    let site = Site {
        listing: vec![
            listing_view(1, 2, 6, &[1, 2]),
            next_disabled(listing_view(3, 4, 6, &[3, 4])),
            listing_view(5, 6, 6, &[5, 6]),
        ],
        ..Site::default()
    };
    let (mut orchestrator, site) = orchestrator(site, dir.path());

    assert_eq!(orchestrator.start(LISTING_URL).await.unwrap(), 4);
    assert_eq!(orchestrator.state().links(), links(&[1, 2, 3, 4]).as_slice());
    assert_eq!(site.opened(), vec![LISTING_URL.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_reclaims_hung_item_once() {
    let dir = TempDir::new().unwrap();
    let site = Site::default()
        .with_item(1, ItemPage::Hang)
        .with_item(2, simple_item(2));
    let (mut orchestrator, site) = orchestrator(site, dir.path());
    orchestrator.on_links_discovered(links(&[1, 2])).unwrap();

    let started = tokio::time::Instant::now();
    assert_eq!(orchestrator.process_next().await.unwrap(), Step::TimedOut);
    assert!(started.elapsed() >= Duration::from_millis(15_000));
    assert_eq!(orchestrator.state().cursor(), 1);
    assert_eq!(orchestrator.state().counters().timed_out, 1);
    assert_eq!(site.open_pages.load(Ordering::SeqCst), 0);

    assert_eq!(orchestrator.process_next().await.unwrap(), Step::Stored);
    assert_eq!(orchestrator.state().cursor(), 2);
    assert_eq!(orchestrator.process_next().await.unwrap(), Step::Complete);

    assert_eq!(orchestrator.state().counters().timed_out, 1);
    assert_eq!(orchestrator.state().records().len(), 1);
    assert_eq!(site.opened(), vec![item_url(1), item_url(2)]);
}

#[tokio::test(start_paused = true)]
async fn test_late_result_after_timeout_is_stale() {
    let dir = TempDir::new().unwrap();
    let site = Site::default().with_item(1, ItemPage::Hang);
    let (mut orchestrator, _site) = orchestrator(site, dir.path());
    orchestrator.on_links_discovered(links(&[1])).unwrap();

    assert_eq!(orchestrator.process_next().await.unwrap(), Step::TimedOut);
    assert_eq!(orchestrator.awaiting(), None);

    // The first ticket handed out after the link set arrived
    let late = Message::ItemExtracted {
        ticket: Ticket {
            generation: 1,
            sequence: 1,
        },
        record: record(1),
    };
    assert_eq!(orchestrator.deliver(late).unwrap(), Ack::Stale);
    assert!(orchestrator.state().records().is_empty());
    assert_eq!(orchestrator.storage().count_records().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_results_without_a_dispatched_item_are_stale() {
    let dir = TempDir::new().unwrap();
    let (mut orchestrator, _site) = orchestrator(Site::default(), dir.path());
    orchestrator.on_links_discovered(links(&[1])).unwrap();

    let ticket = Ticket {
        generation: 0,
        sequence: 7,
    };
    let ack = orchestrator
        .deliver(Message::ExtractionFailed { ticket })
        .unwrap();
    assert_eq!(ack, Ack::Stale);
    assert_eq!(orchestrator.state().counters().failed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_on_extracted_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let (mut orchestrator, _site) = orchestrator(Site::default(), dir.path());

    assert_eq!(orchestrator.on_extracted(record(5)).unwrap(), Ack::DataReceived);

    let mut later = record(5);
    later.upc = Some("999999999999".to_string());
    assert_eq!(orchestrator.on_extracted(later).unwrap(), Ack::DuplicateSkipped);

    // First seen wins
    assert_eq!(orchestrator.state().records().len(), 1);
    assert_eq!(orchestrator.state().records()[0].upc, None);
    assert_eq!(orchestrator.storage().count_records().unwrap(), 1);
    assert_eq!(orchestrator.state().counters().duplicates, 1);
}

#[tokio::test(start_paused = true)]
async fn test_incomplete_records_are_rejected() {
    let dir = TempDir::new().unwrap();
    let (mut orchestrator, _site) = orchestrator(Site::default(), dir.path());

    let mut no_tracks = record(3);
    no_tracks.tracks.clear();
    assert_eq!(orchestrator.on_extracted(no_tracks).unwrap(), Ack::ExtractionFailed);

    let mut no_id = record(4);
    no_id.id = None;
    assert_eq!(orchestrator.on_extracted(no_id).unwrap(), Ack::ExtractionFailed);

    let mut upc_only = record(6);
    upc_only.tracks.clear();
    upc_only.upc = Some("123456789012".to_string());
    assert_eq!(orchestrator.on_extracted(upc_only).unwrap(), Ack::DataReceived);

    assert_eq!(orchestrator.storage().count_records().unwrap(), 1);
    assert_eq!(orchestrator.state().counters().failed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_item_outcomes_do_not_stop_the_crawl() {
    let dir = TempDir::new().unwrap();
    let site = Site::default()
        .with_item(1, ItemPage::Unreachable)
        .with_item(2, ItemPage::Html(item_html(None, &[])))
        .with_item(3, simple_item(3));
    let (mut orchestrator, site) = orchestrator(site, dir.path());

    orchestrator.on_links_discovered(links(&[1, 2, 3, 4])).unwrap();

    assert_eq!(orchestrator.process_next().await.unwrap(), Step::OpenFailed);
    assert_eq!(orchestrator.process_next().await.unwrap(), Step::Failed);
    assert_eq!(orchestrator.process_next().await.unwrap(), Step::Stored);
    // Item 4 is not served at all
    assert_eq!(orchestrator.process_next().await.unwrap(), Step::OpenFailed);
    assert_eq!(orchestrator.process_next().await.unwrap(), Step::Complete);

    let counters = *orchestrator.state().counters();
    assert_eq!(counters.open_failures, 2);
    assert_eq!(counters.failed, 1);
    assert_eq!(counters.extracted, 1);
    assert_eq!(site.max_open_pages.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_covers_a_stalled_open() {
    let dir = TempDir::new().unwrap();
    let site = Site::default()
        .with_item(1, ItemPage::StallOpen)
        .with_item(2, simple_item(2));
    let (mut orchestrator, site) = orchestrator(site, dir.path());
    orchestrator.on_links_discovered(links(&[1, 2])).unwrap();

    let started = tokio::time::Instant::now();
    assert_eq!(orchestrator.process_next().await.unwrap(), Step::TimedOut);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(15_000));
    assert!(elapsed < Duration::from_millis(16_000));
    assert_eq!(orchestrator.awaiting(), None);
    assert_eq!(orchestrator.state().counters().timed_out, 1);
    assert_eq!(orchestrator.state().counters().open_failures, 0);

    assert_eq!(orchestrator.process_next().await.unwrap(), Step::Stored);
    assert_eq!(orchestrator.process_next().await.unwrap(), Step::Complete);
    assert_eq!(site.opened(), vec![item_url(2)]);
}

#[tokio::test(start_paused = true)]
async fn test_lost_browser_halts_without_completing() {
    let dir = TempDir::new().unwrap();
    let site = Site::default()
        .with_item(1, simple_item(1))
        .with_item(2, ItemPage::BrowserGone)
        .with_item(3, simple_item(3));
    let (mut orchestrator, _site) = orchestrator(site, dir.path());
    orchestrator.on_links_discovered(links(&[1, 2, 3])).unwrap();

    let result = orchestrator.run().await;
    assert!(matches!(
        result,
        Err(HarvestError::Page(PageError::Protocol(_)))
    ));

    // Item 2 is handed out again on resume
    assert!(!orchestrator.state().is_complete());
    assert_eq!(orchestrator.state().cursor(), 1);
    assert_eq!(orchestrator.state().records().len(), 1);
    let progress = orchestrator.storage().load_progress().unwrap().unwrap();
    assert!(!progress.complete);
    assert_eq!(progress.cursor, 1);
    assert_eq!(progress.counters.open_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_unservable_items_halt_after_consecutive_failures() {
    let dir = TempDir::new().unwrap();
    let (mut orchestrator, site) = orchestrator(Site::default(), dir.path());
    orchestrator.on_links_discovered(links(&[1, 2, 3])).unwrap();

    let result = orchestrator.run().await;
    assert!(matches!(
        result,
        Err(HarvestError::Page(PageError::Navigation { .. }))
    ));

    assert!(!orchestrator.state().is_complete());
    assert_eq!(orchestrator.state().cursor(), 0);
    assert_eq!(orchestrator.state().counters().open_failures, 3);
    let progress = orchestrator.storage().load_progress().unwrap().unwrap();
    assert!(!progress.complete);
    assert_eq!(progress.cursor, 0);
    assert!(site.opened().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_same_collection_under_two_urls_is_a_duplicate() {
    let dir = TempDir::new().unwrap();
    let alias = format!("{}?tab=tracks", item_url(3));
    let mut site = Site::default().with_item(3, simple_item(3));
    site.items.insert(alias.clone(), simple_item(3));
    let (mut orchestrator, _site) = orchestrator(site, dir.path());

    orchestrator
        .on_links_discovered(vec![ItemLink::new(item_url(3)), ItemLink::new(alias)])
        .unwrap();

    assert_eq!(orchestrator.process_next().await.unwrap(), Step::Stored);
    assert_eq!(orchestrator.process_next().await.unwrap(), Step::Duplicate);
    assert_eq!(orchestrator.state().records().len(), 1);
    assert_eq!(orchestrator.state().counters().duplicates, 1);
}

#[tokio::test(start_paused = true)]
async fn test_reset_between_items_cancels() {
    let dir = TempDir::new().unwrap();
    let site = Site::default().with_item(1, simple_item(1));
    let (mut orchestrator, site) = orchestrator(site, dir.path());
    orchestrator.on_links_discovered(links(&[1])).unwrap();

    assert!(orchestrator.handle().reset());
    assert_eq!(orchestrator.process_next().await.unwrap(), Step::Cancelled);

    assert!(orchestrator.state().links().is_empty());
    assert!(orchestrator.storage().load_links().unwrap().is_empty());
    assert!(site.opened().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reset_during_item_cancels_and_closes_page() {
    let dir = TempDir::new().unwrap();
    let site = Site::default().with_item(1, ItemPage::Hang);
    let (mut orchestrator, site) = orchestrator(site, dir.path());
    orchestrator.on_links_discovered(links(&[1])).unwrap();

    let handle = orchestrator.handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        handle.reset();
    });

    let started = tokio::time::Instant::now();
    let summary = orchestrator.run().await.unwrap();

    assert!(summary.cancelled);
    assert!(!summary.complete);
    assert!(started.elapsed() < Duration::from_millis(15_000));
    assert_eq!(orchestrator.state().counters().timed_out, 0);
    assert!(orchestrator.state().links().is_empty());
    assert_eq!(site.open_pages.load(Ordering::SeqCst), 0);
}

/// Writes the state a crawl interrupted while visiting `in_flight` leaves behind
fn interrupted_crawl(db: &Path, in_flight: usize, stored: &[u32]) {
    let mut storage = SqliteStorage::new(db).unwrap();
    storage.save_links(&links(&[1, 2, 3])).unwrap();
    for id in stored {
        storage.insert_record(&record(*id)).unwrap();
    }
    storage
        .save_progress(&Progress {
            cursor: in_flight,
            ..Progress::default()
        })
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_resume_revisits_unfinished_item() {
    let dir = TempDir::new().unwrap();
    interrupted_crawl(&dir.path().join("harvest.db"), 2, &[1]);

    let site = Site::default()
        .with_item(2, simple_item(2))
        .with_item(3, simple_item(3));
    let (mut orchestrator, site) = orchestrator(site, dir.path());

    assert_eq!(orchestrator.resume().unwrap(), 2);
    assert_eq!(orchestrator.state().cursor(), 1);

    let summary = orchestrator.run().await.unwrap();
    assert!(summary.complete);
    assert_eq!(summary.stored, 3);
    assert_eq!(site.opened(), vec![item_url(2), item_url(3)]);
}

#[tokio::test(start_paused = true)]
async fn test_resume_keeps_cursor_when_in_flight_item_was_stored() {
    let dir = TempDir::new().unwrap();
    interrupted_crawl(&dir.path().join("harvest.db"), 2, &[1, 2]);

    let (mut orchestrator, _site) = orchestrator(Site::default(), dir.path());

    assert_eq!(orchestrator.resume().unwrap(), 1);
    assert_eq!(orchestrator.state().cursor(), 2);
    assert_eq!(orchestrator.state().records().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_resume_warns_but_continues_on_config_change() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("harvest.db");
    interrupted_crawl(&db, 3, &[1, 2, 3]);
    {
        let mut storage = SqliteStorage::new(&db).unwrap();
        storage
            .set_meta(release_harvester::storage::CONFIG_HASH_KEY, "old-hash")
            .unwrap();
    }

    let (orchestrator, _site) = orchestrator(Site::default(), dir.path());
    let mut orchestrator = orchestrator.with_config_hash("new-hash");

    assert_eq!(orchestrator.resume().unwrap(), 0);
    assert_eq!(orchestrator.process_next().await.unwrap(), Step::Complete);
    assert!(orchestrator.state().is_complete());
}

#[tokio::test]
async fn test_run_waits_for_cover_downloads() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/amuse/art.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"jpeg-bytes".to_vec())
                .set_delay(Duration::from_millis(1_500)),
        )
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let page = format!(
        r#"<html><body><div id="__nuxt">
            <img alt="cover art" src="{}/amuse/art.300x300.jpg">
            <div>UPC: 123456789012</div>
        </div></body></html>"#,
        mock_server.uri()
    );
    let site = Site::default().with_item(7, ItemPage::Html(page));
    let (orchestrator, _site) = orchestrator(site, dir.path());
    let covers = dir.path().join("covers");
    let mut orchestrator =
        orchestrator.with_cover_downloader(CoverDownloader::new(covers.clone()).unwrap());
    orchestrator.on_links_discovered(links(&[7])).unwrap();

    let summary = orchestrator.run().await.unwrap();
    assert!(summary.complete);
    let stored = &orchestrator.state().records()[0];
    assert_eq!(
        stored.cover_art_url,
        Some(format!("{}/amuse/art.jpg", mock_server.uri()))
    );

    // The slow download finished before run returned
    assert_eq!(orchestrator.pending_downloads(), 0);
    let saved = std::fs::read(covers.join("7_art.jpg")).unwrap();
    assert_eq!(saved, b"jpeg-bytes");
}
