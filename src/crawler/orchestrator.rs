//! Crawl orchestration
//!
//! The orchestrator owns the [`CrawlState`] and drives the crawl one item at a
//! time: open the item page, hand it to an extraction worker, then wait for
//! either the worker's result or the watchdog. Whichever comes first decides
//! the step; anything arriving later is recognised by its [`Ticket`] and
//! dropped.
//!
//! Workers never touch the state. They report through the orchestrator's
//! message channel, and every mutation is written to storage before the next
//! action is taken.

use crate::config::{Config, CrawlerConfig};
use crate::crawler::assets::CoverDownloader;
use crate::crawler::extractor::Extractor;
use crate::crawler::links::LinkCrawler;
use crate::crawler::strategy::CompiledSelectors;
use crate::model::{CollectionRecord, ItemLink};
use crate::page::{HostPage, PageDriver, PageError};
use crate::state::{Ack, CrawlCounters, CrawlState, Step};
use crate::storage::{load_crawl_state, Progress, Storage, CONFIG_HASH_KEY};
use crate::{HarvestError, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

/// Identifies one dispatched extraction
///
/// The generation changes on every reset and every new link set, the
/// sequence on every dispatched item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    pub generation: u64,
    pub sequence: u64,
}

/// Messages accepted by the orchestrator
#[derive(Debug)]
pub enum Message {
    /// Clear all crawl state
    Reset,
    /// Replace the discovered links
    LinksDiscovered(Vec<ItemLink>),
    /// A worker produced a record
    ItemExtracted {
        ticket: Ticket,
        record: CollectionRecord,
    },
    /// A worker gave up on its item
    ExtractionFailed { ticket: Ticket },
}

/// Sends messages to a running orchestrator from elsewhere
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    sender: mpsc::UnboundedSender<Message>,
}

impl OrchestratorHandle {
    /// Asks the orchestrator to reset; in-flight work is abandoned
    ///
    /// Returns false if the orchestrator no longer exists.
    pub fn reset(&self) -> bool {
        self.send(Message::Reset)
    }

    pub fn send(&self, message: Message) -> bool {
        self.sender.send(message).is_ok()
    }
}

/// Outcome of a [`Orchestrator::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub links: usize,
    pub visited: usize,
    pub stored: usize,
    pub tracks: usize,
    pub counters: CrawlCounters,
    pub complete: bool,
    pub cancelled: bool,
}

/// Sequences link discovery and item extraction
pub struct Orchestrator<D: PageDriver, S: Storage> {
    driver: D,
    storage: S,
    pacing: CrawlerConfig,
    crawler: LinkCrawler,
    extractor: Extractor,
    covers: Option<CoverDownloader>,
    downloads: JoinSet<()>,
    config_hash: Option<String>,
    state: CrawlState,
    generation: u64,
    sequence: u64,
    awaiting: Option<Ticket>,
    /// Item pages in a row that failed to open
    open_failure_streak: u32,
    sender: mpsc::UnboundedSender<Message>,
    receiver: mpsc::UnboundedReceiver<Message>,
}

impl<D: PageDriver, S: Storage> Orchestrator<D, S> {
    /// Creates an orchestrator with an empty crawl state
    ///
    /// # Arguments
    ///
    /// * `driver` - Opens listing and item pages
    /// * `storage` - Receives every state mutation
    /// * `config` - Supplies pacing and selectors
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - Ready to `start` or `resume`
    /// * `Err(HarvestError)` - A selector or pattern failed to compile
    pub fn new(driver: D, storage: S, config: &Config) -> Result<Self> {
        let selectors = Arc::new(CompiledSelectors::compile(&config.selectors)?);
        let crawler = LinkCrawler::new(Arc::clone(&selectors), config.crawler.clone());
        let extractor = Extractor::new(selectors, &config.crawler)?;
        let (sender, receiver) = mpsc::unbounded_channel();

        Ok(Self {
            driver,
            storage,
            pacing: config.crawler.clone(),
            crawler,
            extractor,
            covers: None,
            downloads: JoinSet::new(),
            config_hash: None,
            state: CrawlState::new(),
            generation: 0,
            sequence: 0,
            awaiting: None,
            open_failure_streak: 0,
            sender,
            receiver,
        })
    }

    /// Downloads cover art of every stored record
    pub fn with_cover_downloader(mut self, covers: CoverDownloader) -> Self {
        self.covers = Some(covers);
        self
    }

    /// Records `hash` with a fresh crawl and checks it on resume
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle {
            sender: self.sender.clone(),
        }
    }

    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Ticket of the item whose result would currently be accepted
    pub fn awaiting(&self) -> Option<Ticket> {
        self.awaiting
    }

    /// Clears the crawl state and abandons in-flight work
    pub fn reset(&mut self) -> Result<()> {
        self.invalidate();
        self.state.clear();
        self.storage.clear()?;
        tracing::info!("Crawl state reset");
        Ok(())
    }

    /// Starts a fresh crawl from the listing page
    ///
    /// Clears all state, discovers the item links and stores them. The items
    /// themselves are visited by [`Orchestrator::run`].
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of unique links discovered
    /// * `Err(HarvestError::ListingUnavailable)` - The listing page did not open
    pub async fn start(&mut self, listing_url: &str) -> Result<usize> {
        self.reset()?;
        if let Some(hash) = &self.config_hash {
            self.storage.set_meta(CONFIG_HASH_KEY, hash)?;
        }

        tracing::info!("Opening listing page {}", listing_url);
        let page = self
            .driver
            .open(listing_url)
            .await
            .map_err(|source| HarvestError::ListingUnavailable {
                url: listing_url.to_string(),
                source,
            })?;

        let links = self.crawler.discover(&page).await;
        close_page(&page).await;

        match self.deliver(Message::LinksDiscovered(links))? {
            Ack::LinksReceived(count) => Ok(count),
            _ => Ok(self.state.links().len()),
        }
    }

    /// Reloads the persisted crawl state
    ///
    /// If the item that was in flight when the previous run stopped has no
    /// stored record, the cursor moves back so it is visited again.
    ///
    /// # Returns
    ///
    /// Number of links still to visit
    pub fn resume(&mut self) -> Result<usize> {
        self.invalidate();
        self.state = load_crawl_state(&self.storage)?;

        if let Some(expected) = &self.config_hash {
            match self.storage.get_meta(CONFIG_HASH_KEY)? {
                Some(stored) if &stored != expected => {
                    tracing::warn!("Configuration changed since this crawl started");
                }
                _ => {}
            }
        }

        if !self.state.is_complete() {
            let unfinished = self
                .state
                .in_flight()
                .and_then(ItemLink::collection_id)
                .filter(|id| !self.state.contains_record(id));
            if let Some(id) = unfinished {
                tracing::info!("Revisiting collection {} that was in flight", id);
                self.state.rewind();
                self.persist_progress()?;
            }
        }

        let remaining = self.state.links().len() - self.state.cursor();
        tracing::info!(
            "Resumed crawl: {} links, {} records, {} remaining",
            self.state.links().len(),
            self.state.records().len(),
            remaining
        );
        Ok(remaining)
    }

    /// Applies a message to the crawl state
    ///
    /// Item results are accepted only for the ticket currently awaited;
    /// everything else is acknowledged as stale.
    pub fn deliver(&mut self, message: Message) -> Result<Ack> {
        match message {
            Message::Reset => {
                self.reset()?;
                Ok(Ack::ResetComplete)
            }
            Message::LinksDiscovered(links) => self.on_links_discovered(links),
            Message::ItemExtracted { ticket, record } => {
                if !self.accepts(ticket) {
                    tracing::debug!("Dropping stale result for {:?}", record.id);
                    return Ok(Ack::Stale);
                }
                self.awaiting = None;
                self.on_extracted(record)
            }
            Message::ExtractionFailed { ticket } => {
                if !self.accepts(ticket) {
                    return Ok(Ack::Stale);
                }
                self.awaiting = None;
                self.state.counters_mut().failed += 1;
                self.persist_progress()?;
                Ok(Ack::ExtractionFailed)
            }
        }
    }

    /// Seeds the crawl with a new link set
    pub fn on_links_discovered(&mut self, links: Vec<ItemLink>) -> Result<Ack> {
        self.invalidate();
        let count = self.state.seed(links);
        self.storage.save_links(self.state.links())?;
        self.persist_progress()?;
        tracing::info!("Received {} item links", count);
        Ok(Ack::LinksReceived(count))
    }

    /// Stores a record unless its id was already stored
    ///
    /// Safe to call repeatedly with the same record: the first call stores
    /// it, later calls only count a duplicate.
    pub fn on_extracted(&mut self, record: CollectionRecord) -> Result<Ack> {
        if !record.is_acceptable() {
            tracing::warn!("Rejecting incomplete record from {}", record.source_url);
            self.state.counters_mut().failed += 1;
            self.persist_progress()?;
            return Ok(Ack::ExtractionFailed);
        }

        let id = record.id.clone().unwrap_or_default();
        if self.state.contains_record(&id) {
            tracing::info!("Duplicate collection {}, skipping", id);
            self.state.counters_mut().duplicates += 1;
            self.persist_progress()?;
            return Ok(Ack::DuplicateSkipped);
        }

        self.storage.insert_record(&record)?;
        let cover = record.cover_art_url.clone();
        let tracks = record.track_count();
        self.state.insert_record(record);
        self.state.counters_mut().extracted += 1;
        self.persist_progress()?;
        tracing::info!("Stored collection {} ({} tracks)", id, tracks);

        if let (Some(covers), Some(url)) = (&self.covers, cover) {
            covers.spawn_into(&mut self.downloads, id, url);
        }
        Ok(Ack::DataReceived)
    }

    /// Visits the next item
    ///
    /// Opens the item page, dispatches an extraction worker and waits for its
    /// result, the watchdog or a reset. The page is closed before returning.
    pub async fn process_next(&mut self) -> Result<Step> {
        // Messages sent between items, such as a reset from a handle
        while let Ok(message) = self.receiver.try_recv() {
            if self.deliver(message)? == Ack::ResetComplete {
                return Ok(Step::Cancelled);
            }
        }

        let Some(link) = self.state.advance() else {
            if !self.state.is_complete() {
                self.state.mark_complete();
                self.persist_progress()?;
                tracing::info!("All {} items processed", self.state.links().len());
            }
            return Ok(Step::Complete);
        };
        self.persist_progress()?;

        self.reap_downloads();

        let ticket = self.issue_ticket();
        tracing::info!(
            "Processing item {} of {}: {}",
            self.state.cursor(),
            self.state.links().len(),
            link
        );

        // Opening counts against the watchdog; navigation can stall too
        let deadline = Instant::now() + self.pacing.watchdog();
        let opened = tokio::time::timeout_at(deadline, self.driver.open(link.as_str())).await;
        let page = match opened {
            Ok(Ok(page)) => {
                self.open_failure_streak = 0;
                Arc::new(page)
            }
            Ok(Err(e)) => return self.on_open_failed(&link, e),
            Err(_) => {
                tracing::warn!(
                    "Opening {} took longer than {:?}, moving on",
                    link,
                    self.pacing.watchdog()
                );
                self.awaiting = None;
                self.state.counters_mut().timed_out += 1;
                self.persist_progress()?;
                return Ok(Step::TimedOut);
            }
        };

        let worker = self.spawn_extraction(Arc::clone(&page), ticket);
        let outcome = self.await_result(&link, deadline).await;
        worker.abort();

        match outcome {
            Ok(step @ (Step::Stored | Step::Duplicate | Step::Failed)) => {
                // Let the page finish in-flight requests before closing it
                tokio::time::sleep(self.pacing.close_grace()).await;
                close_page(page.as_ref()).await;
                tokio::time::sleep(self.pacing.next_item_delay()).await;
                Ok(step)
            }
            Ok(step) => {
                close_page(page.as_ref()).await;
                Ok(step)
            }
            Err(e) => {
                close_page(page.as_ref()).await;
                Err(e)
            }
        }
    }

    /// Visits items until every link is done or a reset arrives
    ///
    /// Cover downloads still running when the last item finishes are awaited
    /// before returning.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let cancelled = loop {
            let step = match self.process_next().await {
                Ok(step) => step,
                Err(e) => {
                    self.finish_downloads().await;
                    return Err(e);
                }
            };
            tracing::debug!("Step finished: {:?}", step);
            if !step.should_continue() {
                break step == Step::Cancelled;
            }
        };
        self.finish_downloads().await;
        Ok(self.summary(cancelled))
    }

    /// Waits for every cover download started so far
    pub async fn finish_downloads(&mut self) {
        if !self.downloads.is_empty() {
            tracing::info!("Waiting for {} cover downloads", self.downloads.len());
        }
        while let Some(result) = self.downloads.join_next().await {
            if let Err(e) = result {
                tracing::warn!("Cover download task failed: {}", e);
            }
        }
    }

    /// Cover downloads still running
    pub fn pending_downloads(&self) -> usize {
        self.downloads.len()
    }

    pub fn summary(&self, cancelled: bool) -> RunSummary {
        RunSummary {
            links: self.state.links().len(),
            visited: self.state.cursor(),
            stored: self.state.records().len(),
            tracks: self.state.total_tracks(),
            counters: *self.state.counters(),
            complete: self.state.is_complete(),
            cancelled,
        }
    }

    /// Counts an item page that did not open
    ///
    /// A browser that is gone, or too many failures in a row, halts the
    /// crawl. The failed items are handed out again on resume.
    fn on_open_failed(&mut self, link: &ItemLink, error: PageError) -> Result<Step> {
        tracing::warn!("Could not open {}: {}", link, error);
        self.awaiting = None;
        self.open_failure_streak += 1;
        self.state.counters_mut().open_failures += 1;

        let limit = self.pacing.max_consecutive_open_failures;
        if error.is_fatal() || self.open_failure_streak >= limit {
            let streak = self.open_failure_streak as usize;
            self.state.rewind_by(streak);
            self.open_failure_streak = 0;
            self.persist_progress()?;
            tracing::error!(
                "Halting crawl after {} item pages in a row failed to open",
                streak
            );
            return Err(HarvestError::Page(error));
        }

        self.persist_progress()?;
        Ok(Step::OpenFailed)
    }

    /// Waits for the awaited ticket's result, the watchdog or a reset
    async fn await_result(&mut self, link: &ItemLink, deadline: Instant) -> Result<Step> {
        let watchdog = tokio::time::sleep_until(deadline);
        tokio::pin!(watchdog);

        loop {
            tokio::select! {
                _ = &mut watchdog => {
                    tracing::warn!(
                        "No result for {} within {:?}, moving on",
                        link,
                        self.pacing.watchdog()
                    );
                    self.awaiting = None;
                    self.state.counters_mut().timed_out += 1;
                    self.persist_progress()?;
                    return Ok(Step::TimedOut);
                }
                message = self.receiver.recv() => {
                    // The orchestrator holds a sender, so the channel stays open
                    let Some(message) = message else {
                        continue;
                    };
                    match self.deliver(message)? {
                        Ack::Stale => continue,
                        Ack::DataReceived => return Ok(Step::Stored),
                        Ack::DuplicateSkipped => return Ok(Step::Duplicate),
                        Ack::ExtractionFailed => return Ok(Step::Failed),
                        Ack::ResetComplete | Ack::LinksReceived(_) => return Ok(Step::Cancelled),
                    }
                }
            }
        }
    }

    fn spawn_extraction(&self, page: Arc<D::Page>, ticket: Ticket) -> JoinHandle<()> {
        let extractor = self.extractor.clone();
        let sender = self.sender.clone();
        let settle = self.pacing.item_settle();

        tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            let message = match extractor.extract(page.as_ref()).await {
                Some(record) => Message::ItemExtracted { ticket, record },
                None => Message::ExtractionFailed { ticket },
            };
            // A closed channel means the orchestrator is gone
            let _ = sender.send(message);
        })
    }

    /// Drops finished downloads from the set
    fn reap_downloads(&mut self) {
        while let Some(result) = self.downloads.try_join_next() {
            if let Err(e) = result {
                tracing::warn!("Cover download task failed: {}", e);
            }
        }
    }

    fn issue_ticket(&mut self) -> Ticket {
        self.sequence += 1;
        let ticket = Ticket {
            generation: self.generation,
            sequence: self.sequence,
        };
        self.awaiting = Some(ticket);
        ticket
    }

    fn accepts(&self, ticket: Ticket) -> bool {
        self.awaiting == Some(ticket)
    }

    /// Makes every outstanding ticket stale
    fn invalidate(&mut self) {
        self.generation += 1;
        self.awaiting = None;
        self.open_failure_streak = 0;
    }

    fn persist_progress(&mut self) -> Result<()> {
        self.storage.save_progress(&Progress::of(&self.state))?;
        Ok(())
    }
}

async fn close_page<P: HostPage + ?Sized>(page: &P) {
    if let Err(e) = page.close().await {
        tracing::debug!("Closing page failed: {}", e);
    }
}
