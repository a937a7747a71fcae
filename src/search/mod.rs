//! Search strategies for locating a source video for a track.
//!
//! Each strategy turns a [`TrackQuery`] into at most one [`SearchCandidate`]:
//! the result whose duration is closest to the track's expected duration.
//! The [`SearchArbiter`] sequences strategies under the quota policy.
//!
//! # Architecture
//!
//! - [`SearchStrategy`] - Async trait that individual strategies implement
//! - [`SearchArbiter`] - Priority-ordered, quota-gated strategy loop
//! - [`QuotaGuard`] - Lazy, lock-free cool-down after a primary API quota hit
//! - [`DataApiStrategy`] - Keyed search against the YouTube Data API v3
//! - [`ScrapeStrategy`] - Paginated unauthenticated search via a [`SearchExtractor`]

mod arbiter;
mod data_api;
mod extractor;
mod http_client;
pub mod quota;
mod region;
mod scrape;

pub use arbiter::SearchArbiter;
pub use data_api::{DEFAULT_DATA_API_BASE_URL, DataApiStrategy, parse_iso8601_duration};
pub use extractor::{
    DEFAULT_INNERTUBE_BASE_URL, ExtractedItem, ExtractorError, InnertubeExtractor, ItemKind,
    PageToken, SearchExtractor, SearchPage,
};
pub use http_client::{
    SEARCH_CONNECT_TIMEOUT_SECS, SEARCH_READ_TIMEOUT_SECS, configure_search_http_timeouts,
};
pub use quota::{Clock, QUOTA_TIMEOUT, QuotaGuard, SystemClock};
pub use region::{DEFAULT_REGION_CODE, REGION_CODE_ENDPOINTS, detect_region_code};
pub use scrape::ScrapeStrategy;

use async_trait::async_trait;

use crate::track::{RequesterInfo, TrackQuery};

/// Maximum number of results any strategy considers per search.
pub const MAX_SEARCH_RESULTS: usize = 10;

/// Priority level for strategy ordering.
///
/// Derives `Ord` so that `Primary < Fallback` for sorting (try primary first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StrategyPriority {
    /// Cheap, keyed, quota-limited search.
    Primary = 0,
    /// Expensive unauthenticated search, only used when the primary path yields nothing.
    Fallback = 1,
}

/// A search result paired with its media duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCandidate {
    /// Remote address of the video.
    pub url: String,
    /// Media duration in milliseconds.
    pub duration_ms: u64,
    /// Name of the strategy that produced this candidate.
    pub source: String,
}

impl SearchCandidate {
    /// Creates a new candidate.
    #[must_use]
    pub fn new(url: impl Into<String>, duration_ms: u64, source: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            duration_ms,
            source: source.into(),
        }
    }

    /// Absolute distance between this candidate's duration and `target_ms`.
    #[must_use]
    pub fn duration_delta(&self, target_ms: u64) -> u64 {
        self.duration_ms.abs_diff(target_ms)
    }
}

/// Picks the candidate whose duration is closest to `target_ms`.
///
/// Ties resolve to the earliest candidate in input order.
#[must_use]
pub fn select_closest(
    candidates: impl IntoIterator<Item = SearchCandidate>,
    target_ms: u64,
) -> Option<SearchCandidate> {
    // min_by_key keeps the first of several equal minima
    candidates
        .into_iter()
        .min_by_key(|candidate| candidate.duration_delta(target_ms))
}

/// Trait that all search strategies implement.
///
/// Strategies never fail past their boundary: every transport, status or parse
/// problem is logged and reported as `None`.
///
/// # Object Safety
///
/// Uses `async_trait` so the arbiter can hold `Box<dyn SearchStrategy>`.
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    /// Returns the strategy's name (e.g., "data-api", "innertube").
    fn name(&self) -> &str;

    /// Returns the strategy's priority level.
    fn priority(&self) -> StrategyPriority;

    /// Returns true when this strategy must be skipped while the search quota is exhausted.
    fn quota_gated(&self) -> bool {
        false
    }

    /// Searches for the candidate closest to `query.duration_ms`.
    async fn search(&self, query: &TrackQuery, requester: &RequesterInfo)
    -> Option<SearchCandidate>;
}
