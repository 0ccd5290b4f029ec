//! Crawler module for link discovery, extraction and orchestration
//!
//! This module contains the core crawling logic, including:
//! - Reading rendered DOM snapshots
//! - Named selector strategies with ordered fallbacks
//! - Paginated link discovery on the listing page
//! - Record extraction from item pages with retries
//! - Sequential orchestration with a watchdog per item
//! - Cover art downloads

mod assets;
mod extractor;
mod fields;
mod html;
mod links;
mod orchestrator;
mod strategy;

pub use assets::{build_http_client, create_unique, numbered_variant, original_file_name, CoverDownloader};
pub use extractor::Extractor;
pub use fields::FieldPatterns;
pub use html::{resolve_link, visible_text};
pub use links::{LinkCrawler, Pagination};
pub use orchestrator::{Message, Orchestrator, OrchestratorHandle, RunSummary, Ticket};
pub use strategy::{first_match, CompiledSelectors, CompiledStrategy};
