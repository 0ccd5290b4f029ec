/// Acknowledgement returned for every message delivered to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// State was cleared
    ResetComplete,
    /// Links were seeded (count after de-duplication)
    LinksReceived(usize),
    /// A new record was stored
    DataReceived,
    /// A record with the same id was already stored; first-seen wins
    DuplicateSkipped,
    /// The item produced no acceptable record
    ExtractionFailed,
    /// The message belongs to work that is no longer current
    Stale,
}

/// Result of one `process_next` step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Stored,
    Duplicate,
    Failed,
    /// The watchdog reclaimed the item page
    TimedOut,
    /// The item page could not be opened
    OpenFailed,
    /// Every discovered link has been visited
    Complete,
    /// A reset arrived while the item was in flight
    Cancelled,
}

impl Step {
    /// Returns true if the crawl loop should keep going after this step
    pub fn should_continue(&self) -> bool {
        !matches!(self, Self::Complete | Self::Cancelled)
    }
}
