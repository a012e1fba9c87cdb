//! Service layer for the harvester.
//!
//! This module contains the page-level machinery:
//! - Page sessions (`Session`, `HttpSession`, `ReplaySession`, `MemorySession`)
//! - Request pacing (`Throttle`)
//! - Retry policy (`RetryPolicy`)
//! - Index and listing traversal (`VolumeIndex`, `ListingWalker`)
//! - Detail extraction (`DetailFetcher`)

mod detail;
mod document;
mod listing;
mod retry;
mod session;
mod throttle;

pub use detail::DetailFetcher;
pub use document::{
    DetailSelectors, FieldLabel, FieldSource, HtmlDetailPage, parse_selector, split_history,
};
pub use listing::{
    IndexOutcome, IndexPage, ListingEntry, ListingPage, ListingSelectors, ListingWalker,
    VolumeIndex, WalkState, parse_index, parse_listing,
};
pub use retry::{RetryDecision, RetryPolicy, fetch_once, fetch_page_with_retry};
pub use session::{
    HttpSession, MemorySession, Page, ReplaySession, Session, classify, snapshot_name,
};
pub use throttle::{Identity, InstantSleeper, Sleeper, Throttle, TokioSleeper};
