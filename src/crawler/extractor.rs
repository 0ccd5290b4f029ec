//! Item page extraction
//!
//! The extractor reads a rendered item page and builds a
//! [`CollectionRecord`] with one [`TrackRecord`] per track container. Render
//! timing is absorbed by retrying: an attempt whose record is not acceptable
//! waits and tries again, up to the configured number of attempts.

use crate::config::CrawlerConfig;
use crate::crawler::fields::{self, FieldPatterns};
use crate::crawler::html::{element_text, is_rendered, visible_text, within_any};
use crate::crawler::strategy::{first_match, CompiledSelectors};
use crate::model::{collection_id_from_url, CollectionRecord, TrackList, TrackRecord};
use crate::page::{HostPage, OverlayTargets, PageResult};
use scraper::{ElementRef, Html};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Builds collection records from item pages
///
/// Cheap to clone; clones share the compiled selectors and patterns.
#[derive(Debug, Clone)]
pub struct Extractor {
    selectors: Arc<CompiledSelectors>,
    patterns: Arc<FieldPatterns>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl Extractor {
    /// Creates an extractor
    ///
    /// # Arguments
    ///
    /// * `selectors` - Compiled selector table
    /// * `pacing` - Supplies the attempt limit and the delay between attempts
    ///
    /// # Returns
    ///
    /// * `Ok(Extractor)` - Ready to use
    /// * `Err(regex::Error)` - A field pattern failed to compile
    pub fn new(
        selectors: Arc<CompiledSelectors>,
        pacing: &CrawlerConfig,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            selectors,
            patterns: Arc::new(FieldPatterns::new()?),
            max_attempts: pacing.max_extract_attempts.max(1),
            retry_delay: Duration::from_millis(pacing.extract_retry_delay),
        })
    }

    /// Extracts a record from a live item page
    ///
    /// Every attempt dismisses overlays, snapshots the page and parses the
    /// snapshot. Returns the first acceptable record, or None once the
    /// attempts are used up.
    pub async fn extract<P: HostPage + ?Sized>(&self, page: &P) -> Option<CollectionRecord> {
        for attempt in 1..=self.max_attempts {
            tracing::debug!("Extraction attempt {}/{}", attempt, self.max_attempts);

            let overlays = OverlayTargets {
                close: &self.selectors.overlay_close,
                hide: &self.selectors.overlay_hide,
            };
            match page.dismiss_overlays(overlays).await {
                Ok(0) => {}
                Ok(n) => tracing::debug!("Dismissed {} overlay elements", n),
                Err(e) => tracing::debug!("Overlay dismissal failed: {}", e),
            }

            match snapshot(page).await {
                Ok((html, url)) => {
                    let record = self.parse_item_page(&html, &url);
                    if record.is_acceptable() {
                        tracing::info!(
                            "Extracted collection {} ({} tracks)",
                            record.id.as_deref().unwrap_or("?"),
                            record.track_count()
                        );
                        return Some(record);
                    }
                    tracing::debug!(
                        "Insufficient data on attempt {} (id: {:?}, tracks: {}, upc: {:?})",
                        attempt,
                        record.id,
                        record.track_count(),
                        record.upc
                    );
                }
                Err(e) => tracing::warn!("Could not read item page: {}", e),
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        tracing::warn!(
            "No acceptable record after {} attempts",
            self.max_attempts
        );
        None
    }

    /// Parses one snapshot of an item page
    ///
    /// Never fails: fields that cannot be found are left empty and the
    /// caller decides with [`CollectionRecord::is_acceptable`].
    pub fn parse_item_page(&self, html: &str, page_url: &str) -> CollectionRecord {
        let document = Html::parse_document(html);
        let selectors = &self.selectors;
        let text = visible_text(selectors.body(&document));

        let mut record = CollectionRecord::new(page_url);
        record.id = collection_id_from_url(page_url);
        record.upc = self.patterns.upc(&text);
        record.genre = self.patterns.genre(&text);
        record.release_id = self.patterns.release_id(&text);
        record.release_date = self
            .release_date_attribute(&document)
            .or_else(|| self.patterns.release_date(&text));

        if let Some(src) = self.cover_source(&document, page_url) {
            record.cover_art_url = Some(self.patterns.canonical_cover_url(&src));
            record.cover_art_thumbnail = Some(src);
        }

        record.tracks = self.tracks(&document, &text);
        record
    }

    fn release_date_attribute(&self, document: &Html) -> Option<String> {
        document
            .select(&self.selectors.release_date)
            .next()?
            .value()
            .attr(&self.selectors.release_date_attribute)
            .map(str::trim)
            .filter(|date| !date.is_empty())
            .map(str::to_string)
    }

    /// Absolute source of the first cover image served by the catalog host
    fn cover_source(&self, document: &Html, page_url: &str) -> Option<String> {
        let base = Url::parse(page_url).ok();
        let marker = &self.selectors.cover_host_marker;

        first_match(&self.selectors.cover_art, document, "cover art", |img| {
            let src = img.value().attr("src")?;
            let src = match &base {
                Some(base) => base.join(src).map(|u| u.to_string()).ok()?,
                None => src.to_string(),
            };
            if src.contains(marker.as_str()) {
                Some(src)
            } else {
                None
            }
        })
    }

    /// Track containers outside overlay regions that carry a track marker
    fn track_containers<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        let selectors = &self.selectors;
        let root = selectors.content_root(document);
        let outside_overlays = |c: &ElementRef<'_>| !within_any(*c, &selectors.overlay_regions);

        let mut containers: Vec<_> = root
            .select(&selectors.primary_container)
            .filter(outside_overlays)
            .collect();
        tracing::debug!("Found {} primary track containers", containers.len());

        if containers.is_empty() {
            containers = root
                .select(&selectors.secondary_container)
                .filter(outside_overlays)
                .collect();
            tracing::debug!("Broader search found {} containers", containers.len());
        }

        containers.retain(|container| {
            container.select(&selectors.isrc_label).next().is_some()
                || container.select(&selectors.audio_file_label).next().is_some()
                || container.select(&selectors.contributors_label).next().is_some()
        });
        containers
    }

    fn tracks(&self, document: &Html, page_text: &str) -> Vec<TrackRecord> {
        let containers = self.track_containers(document);

        if containers.is_empty() {
            tracing::debug!("No track containers, extracting a single track from the page");
            let track = self.single_track(document, page_text);
            if track.has_content() {
                return vec![track];
            }
            tracing::warn!("No track data found on page");
            return Vec::new();
        }

        let mut tracks = TrackList::new();
        for (index, container) in containers.into_iter().enumerate() {
            // Numbering follows container order on the page
            let track = self.container_track(container, index as u32 + 1);
            if !track.has_content() {
                tracing::warn!("Container {} has no track data", index + 1);
                continue;
            }
            let name = track.song_name.clone();
            if !tracks.push(track, index) {
                tracing::debug!("Skipping duplicate track {:?}", name);
            }
        }
        tracks.into_vec()
    }

    fn container_track(&self, container: ElementRef<'_>, track_number: u32) -> TrackRecord {
        let selectors = &self.selectors;
        let mut track = TrackRecord::new(track_number);

        track.song_name = container
            .select(&selectors.container_name)
            .next()
            .map(element_text)
            .filter(|name| !name.is_empty())
            .map(|name| self.patterns.strip_track_prefix(&name));
        track.isrc = fields::isrc(selectors, &self.patterns, container, true);
        fields::contributors(selectors, container, &mut track);
        track.audio_file_name = fields::audio_file_name(selectors, container);
        track
    }

    fn single_track(&self, document: &Html, page_text: &str) -> TrackRecord {
        let selectors = &self.selectors;
        let body = selectors.body(document);
        let mut track = TrackRecord::new(1);

        track.song_name = self.single_track_name(document);
        track.isrc = fields::labelled_isrc(selectors, body, false)
            .or_else(|| self.patterns.isrc(page_text));
        fields::contributors(selectors, body, &mut track);
        track.audio_file_name = fields::audio_file_name(selectors, body);
        track
    }

    /// First visible, non-boilerplate name found by the track-name lookups
    fn single_track_name(&self, document: &Html) -> Option<String> {
        let selectors = &self.selectors;
        for selector in &selectors.track_name {
            for element in document.select(selector) {
                if within_any(element, &selectors.single_track_excluded)
                    || within_any(element, &selectors.hidden_elements)
                    || !is_rendered(element)
                {
                    continue;
                }
                let name = element_text(element);
                if name.is_empty()
                    || selectors
                        .non_song_names
                        .iter()
                        .any(|boilerplate| name.contains(boilerplate.as_str()))
                {
                    continue;
                }
                return Some(self.patterns.strip_track_prefix(&name));
            }
        }
        None
    }
}

async fn snapshot<P: HostPage + ?Sized>(page: &P) -> PageResult<(String, String)> {
    let html = page.content().await?;
    let url = page.url().await?;
    Ok((html, url))
}
