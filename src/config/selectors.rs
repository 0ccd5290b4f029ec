//! Selector tables for the catalog's markup
//!
//! Every CSS selector the crawler and extractor rely on lives here so that a
//! change in the catalog's page structure is a configuration change. The
//! defaults describe the markup the catalog serves today.

use serde::Deserialize;

/// A named way of locating one element
///
/// The first element matching `selector` (and, when set, whose text contains
/// `text-contains`) is the strategy's result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Strategy {
    pub name: String,
    pub selector: String,
    #[serde(rename = "text-contains", default)]
    pub text_contains: Option<String>,
}

impl Strategy {
    pub fn css(name: &str, selector: &str) -> Self {
        Self {
            name: name.to_string(),
            selector: selector.to_string(),
            text_contains: None,
        }
    }

    pub fn text(name: &str, selector: &str, contains: &str) -> Self {
        Self {
            name: name.to_string(),
            selector: selector.to_string(),
            text_contains: Some(contains.to_string()),
        }
    }
}

/// All selectors used while crawling, grouped by page
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    // ===== Listing page =====
    #[serde(rename = "list-view-tab")]
    pub list_view_tab: Vec<Strategy>,

    /// Closest clickable ancestor of a matched tab element
    #[serde(rename = "tab-click-target")]
    pub tab_click_target: String,

    /// Element carrying `first`, `last` and `total` pagination attributes
    #[serde(rename = "pagination-label")]
    pub pagination_label: String,

    /// Directional icons inside the pagination control ("previous" first)
    #[serde(rename = "pagination-chevron")]
    pub pagination_chevron: String,

    #[serde(rename = "listing-row")]
    pub listing_row: String,

    /// Substring every item link must contain
    #[serde(rename = "item-link-marker")]
    pub item_link_marker: String,

    // ===== Overlays =====
    #[serde(rename = "overlay-close")]
    pub overlay_close: String,

    #[serde(rename = "overlay-hide")]
    pub overlay_hide: String,

    /// Popup regions whose descendants are never treated as content
    #[serde(rename = "overlay-regions")]
    pub overlay_regions: Vec<String>,

    /// Regions additionally skipped by single-track name lookup
    #[serde(rename = "single-track-excluded")]
    pub single_track_excluded: Vec<String>,

    /// Utility classes that hide an element through a stylesheet
    #[serde(rename = "hidden-elements")]
    pub hidden_elements: Vec<String>,

    // ===== Item page =====
    /// Content root candidates, first match wins
    #[serde(rename = "content-root")]
    pub content_root: Vec<String>,

    #[serde(rename = "primary-container")]
    pub primary_container: String,

    #[serde(rename = "secondary-container")]
    pub secondary_container: String,

    #[serde(rename = "isrc-label")]
    pub isrc_label: String,

    #[serde(rename = "audio-file-label")]
    pub audio_file_label: String,

    #[serde(rename = "contributors-label")]
    pub contributors_label: String,

    #[serde(rename = "splits-label")]
    pub splits_label: String,

    /// Light-weight value element next to a label
    #[serde(rename = "label-value")]
    pub label_value: String,

    /// Unlabelled value element, last resort for ISRC values
    #[serde(rename = "bare-value")]
    pub bare_value: String,

    #[serde(rename = "container-name")]
    pub container_name: String,

    /// Song-name lookups for pages without track containers
    #[serde(rename = "track-name")]
    pub track_name: Vec<String>,

    /// Texts that are never song names (substring match)
    #[serde(rename = "non-song-names")]
    pub non_song_names: Vec<String>,

    #[serde(rename = "list-rows")]
    pub list_rows: String,

    #[serde(rename = "contributor-name")]
    pub contributor_name: String,

    #[serde(rename = "contributor-role")]
    pub contributor_role: String,

    #[serde(rename = "split-share")]
    pub split_share: String,

    #[serde(rename = "release-date")]
    pub release_date: String,

    #[serde(rename = "release-date-attribute")]
    pub release_date_attribute: String,

    #[serde(rename = "cover-art")]
    pub cover_art: Vec<Strategy>,

    /// Substring a cover image source must contain to be accepted
    #[serde(rename = "cover-host-marker")]
    pub cover_host_marker: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        let overlay_regions = vec![
            "#onetrust-consent-sdk".to_string(),
            ".onetrust-pc-dark-filter".to_string(),
            "#intercom-frame".to_string(),
            ".intercom-lightweight-app".to_string(),
            "#toasts".to_string(),
        ];

        Self {
            list_view_tab: vec![
                Strategy::css(
                    "live-tab-label",
                    r#"span[data-path="releases_list_tab_live_title"]"#,
                ),
                Strategy::text("live-tab-text", "span", "Delivered or Live"),
                Strategy::css(
                    "live-tab-any-element",
                    r#"[data-path="releases_list_tab_live_title"]"#,
                ),
                Strategy::css("counted-span", "span[count]"),
            ],
            tab_click_target: r#"button, a, div[role="tab"], li"#.to_string(),
            pagination_label: r#"span[data-path="pagination_lbl"]"#.to_string(),
            pagination_chevron: r#"button svg path[d*="M5.29016"]"#.to_string(),
            listing_row: r#"a[data-testid="data_table_row"][href*="/studio/collection/"]"#
                .to_string(),
            item_link_marker: "/studio/collection/".to_string(),

            overlay_close: "#close-pc-btn-handler, .onetrust-close-btn-handler".to_string(),
            overlay_hide: "#onetrust-consent-sdk, .onetrust-pc-dark-filter".to_string(),
            overlay_regions,
            single_track_excluded: vec![
                "header a".to_string(),
                "script".to_string(),
                "style".to_string(),
            ],
            hidden_elements: vec![
                ".hidden".to_string(),
                ".invisible".to_string(),
                ".sr-only".to_string(),
            ],

            content_root: vec![
                "#__nuxt".to_string(),
                "#app".to_string(),
                "body".to_string(),
            ],
            primary_container: ".bg-surface-3.mb-6".to_string(),
            secondary_container: ".p-6.bg-surface-3, .bg-surface-3".to_string(),
            isrc_label: r#"span[data-path="core_lbl_isrc_text"]"#.to_string(),
            audio_file_label: r#"span[data-path="core_lbl_audio_file"]"#.to_string(),
            contributors_label: r#"span[data-path="core_lbl_contributors"]"#.to_string(),
            splits_label: r#"span[data-path="core_lbl_splits"]"#.to_string(),
            label_value: "span.font-light".to_string(),
            bare_value: "span:not([data-path])".to_string(),
            container_name: ".name, h4 span.name, h4".to_string(),
            track_name: vec![
                "header .text-title-large".to_string(),
                "h4.text-title-large".to_string(),
                ".name".to_string(),
                "h4:not(#onetrust-pc-title)".to_string(),
            ],
            non_song_names: [
                "Strictly Necessary Cookies",
                "Functional Cookies",
                "Performance Cookies",
                "Targeting Cookies",
                "Privacy Preference Center",
                "Cookie List",
                "Artist Toolbox",
                "Store Sync",
                "Buy",
                "Allow all",
                "Confirm My Choices",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            list_rows: "ul li".to_string(),
            contributor_name: "span.font-bold".to_string(),
            contributor_role: "span.artist-roles".to_string(),
            split_share: "span.mr-2".to_string(),
            release_date: r#"span[data-path="release_timeline_info_received"]"#.to_string(),
            release_date_attribute: "date".to_string(),
            cover_art: vec![
                Strategy::css("cover-art-class", "img.img-cover-art-img"),
                Strategy::css("cover-alt", r#"img[alt*="cover"]"#),
                Strategy::css("artwork-alt", r#"img[alt*="artwork"]"#),
                Strategy::css("cover-art-wrapper", ".cover-art img"),
                Strategy::css("cdn-source", r#"img[src*="cdn.amuse.io"]"#),
            ],
            cover_host_marker: "amuse".to_string(),
        }
    }
}
