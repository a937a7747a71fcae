//! Unauthenticated, paginated search extraction.
//!
//! A [`SearchExtractor`] returns result pages the way a scraping library
//! would: a first page for a query, then further pages addressed by opaque
//! [`PageToken`]s. [`InnertubeExtractor`] implements it against the web
//! client's internal search endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::error::SearchError;

use super::http_client::build_search_http_client;

/// Default internal API base URL.
pub const DEFAULT_INNERTUBE_BASE_URL: &str = "https://www.youtube.com/youtubei/v1";

/// Web client version announced in request contexts.
const INNERTUBE_CLIENT_VERSION: &str = "2.20240726.00.00";

/// Search filter restricting results to videos.
const VIDEOS_FILTER_PARAMS: &str = "EgIQAQ%3D%3D";

/// Kind of a search result item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// On-demand video with a known length.
    Video,
    /// Currently live broadcast.
    LiveStream,
    /// Scheduled premiere or broadcast.
    Upcoming,
    /// Channel result.
    Channel,
    /// Playlist result.
    Playlist,
}

/// One item from a search result page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedItem {
    /// Item address.
    pub url: String,
    /// Length in seconds, when the item has one.
    pub duration_secs: Option<u64>,
    /// Item kind.
    pub kind: ItemKind,
}

impl ExtractedItem {
    /// Creates an on-demand video item.
    #[must_use]
    pub fn video(url: impl Into<String>, duration_secs: u64) -> Self {
        Self {
            url: url.into(),
            duration_secs: Some(duration_secs),
            kind: ItemKind::Video,
        }
    }

    /// Creates an item without a length.
    #[must_use]
    pub fn other(url: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            url: url.into(),
            duration_secs: None,
            kind,
        }
    }
}

/// Opaque continuation handle for the next result page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(pub String);

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    /// Items in page order.
    pub items: Vec<ExtractedItem>,
    /// Handle for the following page, if any.
    pub next_page: Option<PageToken>,
}

/// Errors raised while fetching a result page.
#[derive(Debug, Error)]
pub enum ExtractorError {
    /// Transport-level failure.
    #[error("search request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("search endpoint returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The page could not be understood.
    #[error("unexpected search response: {reason}")]
    Parse {
        /// What was wrong with the page.
        reason: String,
    },
}

/// Paginated search source.
#[async_trait]
pub trait SearchExtractor: Send + Sync {
    /// Fetches the first result page for `query`.
    async fn search(&self, query: &str) -> Result<SearchPage, ExtractorError>;

    /// Fetches the page addressed by `page` for `query`.
    async fn more_items(&self, query: &str, page: &PageToken)
    -> Result<SearchPage, ExtractorError>;
}

#[async_trait]
impl<T: SearchExtractor + ?Sized> SearchExtractor for std::sync::Arc<T> {
    async fn search(&self, query: &str) -> Result<SearchPage, ExtractorError> {
        (**self).search(query).await
    }

    async fn more_items(
        &self,
        query: &str,
        page: &PageToken,
    ) -> Result<SearchPage, ExtractorError> {
        (**self).more_items(query, page).await
    }
}

/// [`SearchExtractor`] over the web client's internal search endpoint.
pub struct InnertubeExtractor {
    client: Client,
    base_url: String,
}

impl InnertubeExtractor {
    /// Creates an extractor against the public endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if HTTP client construction fails.
    pub fn new() -> Result<Self, SearchError> {
        Self::with_base_url(DEFAULT_INNERTUBE_BASE_URL)
    }

    /// Creates an extractor with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if HTTP client construction fails.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, SearchError> {
        Ok(Self {
            client: build_search_http_client("innertube")?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post_search(&self, body: Value) -> Result<SearchPage, ExtractorError> {
        let url = format!("{}/search?prettyPrint=false", self.base_url);
        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractorError::Status {
                status: status.as_u16(),
            });
        }

        let page: Value = response.json().await.map_err(|e| ExtractorError::Parse {
            reason: e.to_string(),
        })?;
        Ok(parse_search_page(&page))
    }
}

impl std::fmt::Debug for InnertubeExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InnertubeExtractor")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SearchExtractor for InnertubeExtractor {
    #[instrument(skip(self), fields(extractor = "innertube"))]
    async fn search(&self, query: &str) -> Result<SearchPage, ExtractorError> {
        self.post_search(json!({
            "context": client_context(),
            "query": query,
            "params": VIDEOS_FILTER_PARAMS,
        }))
        .await
    }

    #[instrument(skip(self, page), fields(extractor = "innertube"))]
    async fn more_items(
        &self,
        query: &str,
        page: &PageToken,
    ) -> Result<SearchPage, ExtractorError> {
        self.post_search(json!({
            "context": client_context(),
            "continuation": page.0,
        }))
        .await
    }
}

fn client_context() -> Value {
    json!({
        "client": {
            "clientName": "WEB",
            "clientVersion": INNERTUBE_CLIENT_VERSION,
            "hl": "en",
        }
    })
}

// ==================== Page Parsing ====================

/// Collects result items and the continuation token from a search response.
///
/// Works for both first pages and continuation pages: renderers are found
/// wherever they sit in the tree, in document order.
fn parse_search_page(page: &Value) -> SearchPage {
    let mut out = SearchPage::default();
    collect_renderers(page, &mut out);
    debug!(
        items = out.items.len(),
        has_next = out.next_page.is_some(),
        "Parsed search page"
    );
    out
}

fn collect_renderers(value: &Value, out: &mut SearchPage) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match key.as_str() {
                    "videoRenderer" => out.items.extend(video_item(child)),
                    "channelRenderer" => out.items.extend(
                        str_at(child, &["channelId"]).map(|id| {
                            ExtractedItem::other(
                                format!("https://www.youtube.com/channel/{id}"),
                                ItemKind::Channel,
                            )
                        }),
                    ),
                    "playlistRenderer" => out.items.extend(
                        str_at(child, &["playlistId"]).map(|id| {
                            ExtractedItem::other(
                                format!("https://www.youtube.com/playlist?list={id}"),
                                ItemKind::Playlist,
                            )
                        }),
                    ),
                    "continuationCommand" => {
                        if let Some(token) = str_at(child, &["token"]) {
                            out.next_page = Some(PageToken(token.to_string()));
                        }
                    }
                    _ => collect_renderers(child, out),
                }
            }
        }
        Value::Array(values) => {
            for child in values {
                collect_renderers(child, out);
            }
        }
        _ => {}
    }
}

fn video_item(renderer: &Value) -> Option<ExtractedItem> {
    let id = str_at(renderer, &["videoId"])?;
    let url = format!("https://www.youtube.com/watch?v={id}");

    if renderer.get("upcomingEventData").is_some() {
        return Some(ExtractedItem::other(url, ItemKind::Upcoming));
    }
    match str_at(renderer, &["lengthText", "simpleText"]) {
        Some(length) => match parse_clock_duration(length) {
            Some(secs) => Some(ExtractedItem::video(url, secs)),
            None => {
                debug!(video_id = id, length, "Skipping video with unparseable length");
                None
            }
        },
        // No length on a video result means it is broadcasting right now.
        None => Some(ExtractedItem::other(url, ItemKind::LiveStream)),
    }
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |current, key| current.get(key))?
        .as_str()
}

/// Parses `SS`, `M:SS` or `H:MM:SS` into seconds.
fn parse_clock_duration(text: &str) -> Option<u64> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    parts.iter().try_fold(0_u64, |total, part| {
        let value = part.parse::<u64>().ok()?;
        total.checked_mul(60)?.checked_add(value)
    })
}
