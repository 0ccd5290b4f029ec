//! Named selector strategies and the compiled selector table
//!
//! A strategy is an ordered fallback: each entry is tried in turn and the
//! first one that produces a value wins. The winning strategy's name is logged
//! so that drift in the catalog's markup shows up in the logs.

use crate::config::{SelectorConfig, Strategy};
use crate::crawler::html::element_text;
use crate::{ConfigError, ConfigResult};
use scraper::{ElementRef, Html, Selector};

/// Parses one selector, naming the config field on failure
fn css(field: &str, selector: &str) -> ConfigResult<Selector> {
    Selector::parse(selector).map_err(|e| {
        ConfigError::InvalidSelector(format!("{} '{}': {:?}", field, selector, e))
    })
}

fn css_list(field: &str, selectors: &[String]) -> ConfigResult<Vec<Selector>> {
    selectors.iter().map(|s| css(field, s)).collect()
}

/// One compiled strategy
#[derive(Debug, Clone)]
pub struct CompiledStrategy {
    pub name: String,
    selector: Selector,
    text_contains: Option<String>,
}

impl CompiledStrategy {
    pub fn compile(field: &str, strategy: &Strategy) -> ConfigResult<Self> {
        Ok(Self {
            name: strategy.name.clone(),
            selector: css(&format!("{}.{}", field, strategy.name), &strategy.selector)?,
            text_contains: strategy.text_contains.clone(),
        })
    }

    /// First element in document order matching this strategy
    pub fn find<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        document.select(&self.selector).find(|element| match &self.text_contains {
            Some(needle) => element_text(*element).contains(needle.as_str()),
            None => true,
        })
    }
}

/// Tries each strategy in order and returns the first accepted value
///
/// `accept` sees the first element each strategy finds; returning None moves
/// on to the next strategy.
pub fn first_match<'a, T>(
    strategies: &[CompiledStrategy],
    document: &'a Html,
    purpose: &str,
    mut accept: impl FnMut(ElementRef<'a>) -> Option<T>,
) -> Option<T> {
    for strategy in strategies {
        if let Some(value) = strategy.find(document).and_then(&mut accept) {
            tracing::debug!("{}: matched strategy '{}'", purpose, strategy.name);
            return Some(value);
        }
    }
    tracing::debug!("{}: no strategy matched", purpose);
    None
}

/// Every selector of [`SelectorConfig`], parsed once
#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    // Listing page
    pub list_view_tab: Vec<CompiledStrategy>,
    pub tab_click_target: Selector,
    pub pagination_label: Selector,
    pub pagination_chevron: Selector,
    pub listing_row: Selector,
    pub item_link_marker: String,

    // Overlays, kept as text for the page backend
    pub overlay_close: String,
    pub overlay_hide: String,
    pub overlay_regions: Vec<Selector>,
    /// Overlay regions plus the single-track exclusions
    pub single_track_excluded: Vec<Selector>,
    /// Stylesheet-hidden elements, invisible in a snapshot's attributes
    pub hidden_elements: Vec<Selector>,

    // Item page
    pub content_root: Vec<Selector>,
    pub primary_container: Selector,
    pub secondary_container: Selector,
    pub isrc_label: Selector,
    pub audio_file_label: Selector,
    pub contributors_label: Selector,
    pub splits_label: Selector,
    pub label_value: Selector,
    pub bare_value: Selector,
    pub container_name: Selector,
    pub track_name: Vec<Selector>,
    pub non_song_names: Vec<String>,
    pub list_rows: Selector,
    pub contributor_name: Selector,
    pub contributor_role: Selector,
    pub split_share: Selector,
    pub release_date: Selector,
    pub release_date_attribute: String,
    pub cover_art: Vec<CompiledStrategy>,
    pub cover_host_marker: String,

    // Structural lookups
    pub div: Selector,
    pub button: Selector,
    pub body: Selector,
}

impl CompiledSelectors {
    /// Compiles a selector table
    ///
    /// # Returns
    ///
    /// * `Ok(CompiledSelectors)` - Every selector parsed
    /// * `Err(ConfigError::InvalidSelector)` - The first selector that did not
    pub fn compile(config: &SelectorConfig) -> ConfigResult<Self> {
        let overlay_regions = css_list("overlay-regions", &config.overlay_regions)?;
        let mut single_track_excluded = overlay_regions.clone();
        single_track_excluded.extend(css_list(
            "single-track-excluded",
            &config.single_track_excluded,
        )?);

        // Overlay selectors run in the browser; parsing them here still
        // rejects a typo at load time
        css("overlay-close", &config.overlay_close)?;
        css("overlay-hide", &config.overlay_hide)?;

        Ok(Self {
            list_view_tab: config
                .list_view_tab
                .iter()
                .map(|s| CompiledStrategy::compile("list-view-tab", s))
                .collect::<ConfigResult<_>>()?,
            tab_click_target: css("tab-click-target", &config.tab_click_target)?,
            pagination_label: css("pagination-label", &config.pagination_label)?,
            pagination_chevron: css("pagination-chevron", &config.pagination_chevron)?,
            listing_row: css("listing-row", &config.listing_row)?,
            item_link_marker: config.item_link_marker.clone(),

            overlay_close: config.overlay_close.clone(),
            overlay_hide: config.overlay_hide.clone(),
            overlay_regions,
            single_track_excluded,
            hidden_elements: css_list("hidden-elements", &config.hidden_elements)?,

            content_root: css_list("content-root", &config.content_root)?,
            primary_container: css("primary-container", &config.primary_container)?,
            secondary_container: css("secondary-container", &config.secondary_container)?,
            isrc_label: css("isrc-label", &config.isrc_label)?,
            audio_file_label: css("audio-file-label", &config.audio_file_label)?,
            contributors_label: css("contributors-label", &config.contributors_label)?,
            splits_label: css("splits-label", &config.splits_label)?,
            label_value: css("label-value", &config.label_value)?,
            bare_value: css("bare-value", &config.bare_value)?,
            container_name: css("container-name", &config.container_name)?,
            track_name: css_list("track-name", &config.track_name)?,
            non_song_names: config.non_song_names.clone(),
            list_rows: css("list-rows", &config.list_rows)?,
            contributor_name: css("contributor-name", &config.contributor_name)?,
            contributor_role: css("contributor-role", &config.contributor_role)?,
            split_share: css("split-share", &config.split_share)?,
            release_date: css("release-date", &config.release_date)?,
            release_date_attribute: config.release_date_attribute.clone(),
            cover_art: config
                .cover_art
                .iter()
                .map(|s| CompiledStrategy::compile("cover-art", s))
                .collect::<ConfigResult<_>>()?,
            cover_host_marker: config.cover_host_marker.clone(),

            div: css("div", "div")?,
            button: css("button", "button")?,
            body: css("body", "body")?,
        })
    }

    /// Root element searched for track containers
    pub fn content_root<'a>(&self, document: &'a Html) -> ElementRef<'a> {
        self.content_root
            .iter()
            .find_map(|selector| document.select(selector).next())
            .unwrap_or_else(|| document.root_element())
    }

    /// The document body, or the root element for fragments
    pub fn body<'a>(&self, document: &'a Html) -> ElementRef<'a> {
        document
            .select(&self.body)
            .next()
            .unwrap_or_else(|| document.root_element())
    }
}
