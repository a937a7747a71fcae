//! Fallback search strategy over a paginated [`SearchExtractor`].

use async_trait::async_trait;
use tracing::{debug, error, instrument, warn};

use crate::track::{RequesterInfo, TrackQuery};

use super::extractor::{ExtractedItem, ItemKind, SearchExtractor};
use super::{MAX_SEARCH_RESULTS, SearchCandidate, SearchStrategy, StrategyPriority, select_closest};

/// Unauthenticated search that walks result pages until
/// [`MAX_SEARCH_RESULTS`] on-demand videos are collected.
///
/// A failure on the first page yields no candidate; a failure on a later page
/// keeps what was collected so far.
pub struct ScrapeStrategy<E> {
    extractor: E,
}

impl<E: SearchExtractor> ScrapeStrategy<E> {
    /// Creates a strategy over `extractor`.
    #[must_use]
    pub fn new(extractor: E) -> Self {
        Self { extractor }
    }

    /// Collects up to [`MAX_SEARCH_RESULTS`] on-demand videos for `text`.
    async fn collect_videos(&self, text: &str) -> Vec<ExtractedItem> {
        let first = match self.extractor.search(text).await {
            Ok(page) => page,
            Err(e) => {
                error!(query = %text, error = %e, "Failed to acquire search results");
                return Vec::new();
            }
        };

        let mut videos: Vec<ExtractedItem> = first.items.into_iter().filter(is_on_demand).collect();
        let mut next_page = first.next_page;

        while videos.len() < MAX_SEARCH_RESULTS
            && let Some(token) = next_page.take()
        {
            match self.extractor.more_items(text, &token).await {
                Ok(page) => {
                    debug!(page_items = page.items.len(), "Fetched additional search page");
                    videos.extend(page.items.into_iter().filter(is_on_demand));
                    next_page = page.next_page;
                }
                Err(e) => {
                    warn!(query = %text, error = %e, "Failed to acquire additional search pages");
                    break;
                }
            }
        }

        videos.truncate(MAX_SEARCH_RESULTS);
        videos
    }
}

fn is_on_demand(item: &ExtractedItem) -> bool {
    item.kind == ItemKind::Video && item.duration_secs.is_some()
}

impl<E> std::fmt::Debug for ScrapeStrategy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeStrategy").finish_non_exhaustive()
    }
}

#[async_trait]
impl<E: SearchExtractor> SearchStrategy for ScrapeStrategy<E> {
    fn name(&self) -> &'static str {
        "scrape"
    }

    fn priority(&self) -> StrategyPriority {
        StrategyPriority::Fallback
    }

    #[instrument(skip(self, query, requester), fields(strategy = "scrape", track = %query.id))]
    async fn search(
        &self,
        query: &TrackQuery,
        requester: &RequesterInfo,
    ) -> Option<SearchCandidate> {
        let text = query.search_text();
        let videos = self.collect_videos(&text).await;

        let candidates = videos.into_iter().filter_map(|item| {
            let secs = item.duration_secs?;
            Some(SearchCandidate::new(
                item.url,
                secs.saturating_mul(1_000),
                self.name(),
            ))
        });

        let chosen = select_closest(candidates, query.duration_ms);
        if chosen.is_none() {
            warn!(requester = %requester, query = %text, "Scrape search turned up nothing");
        }
        chosen
    }
}
