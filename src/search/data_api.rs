//! Keyed primary search against the YouTube Data API v3.
//!
//! The [`DataApiStrategy`] runs a `search` call for up to
//! [`MAX_SEARCH_RESULTS`] video ids, then a batched `videos` call to read exact
//! durations, and picks the video closest to the track's duration. An HTTP 403
//! from either call marks the shared [`QuotaGuard`] as exhausted.

use std::sync::{Arc, LazyLock, RwLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::error::SearchError;
use crate::track::{RequesterInfo, TrackQuery, video_link};

use super::http_client::build_search_http_client;
use super::region::{DEFAULT_REGION_CODE, REGION_CODE_ENDPOINTS, detect_region_code};
use super::{
    MAX_SEARCH_RESULTS, QuotaGuard, SearchCandidate, SearchStrategy, StrategyPriority,
    select_closest,
};

/// Default Data API base URL.
pub const DEFAULT_DATA_API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// ISO-8601 durations as used by the Data API: `P1DT2H3M4S`, `PT3M25S`, `PT45.5S`.
#[allow(clippy::expect_used)]
static ISO8601_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)(?:\.(\d+))?S)?)?$")
        .expect("ISO-8601 duration regex is valid") // Static pattern, safe to panic
});

// ==================== Data API Response Types ====================

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResults {
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchItem {
    pub id: SearchItemId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchItemId {
    pub video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentResults {
    #[serde(default)]
    pub items: Vec<ContentItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContentItem {
    pub id: String,
    pub content_details: ContentDetails,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentDetails {
    pub duration: String,
}

// ==================== DataApiStrategy ====================

/// Primary search strategy backed by the YouTube Data API v3.
///
/// Without an API key the strategy never touches the network and always
/// reports no candidate.
pub struct DataApiStrategy {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    quota: Arc<QuotaGuard>,
    region_code: Arc<RwLock<String>>,
}

impl DataApiStrategy {
    /// Creates a strategy against the public Data API.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if HTTP client construction fails.
    pub fn new(api_key: Option<String>, quota: Arc<QuotaGuard>) -> Result<Self, SearchError> {
        Self::with_base_url(api_key, quota, DEFAULT_DATA_API_BASE_URL)
    }

    /// Creates a strategy with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if HTTP client construction fails.
    pub fn with_base_url(
        api_key: Option<String>,
        quota: Arc<QuotaGuard>,
        base_url: impl Into<String>,
    ) -> Result<Self, SearchError> {
        let client = build_search_http_client("data-api")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            quota,
            region_code: Arc::new(RwLock::new(DEFAULT_REGION_CODE.to_string())),
        })
    }

    /// Returns true when an API key is configured.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Region code sent with search requests.
    #[must_use]
    pub fn region_code(&self) -> String {
        self.region_code
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_else(|_| DEFAULT_REGION_CODE.to_string())
    }

    /// Overrides the region code sent with search requests.
    pub fn set_region_code(&self, code: impl Into<String>) {
        if let Ok(mut guard) = self.region_code.write() {
            *guard = code.into();
        }
    }

    /// Detects the region code in the background from [`REGION_CODE_ENDPOINTS`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_region_detection(&self) -> JoinHandle<()> {
        let client = self.client.clone();
        let slot = Arc::clone(&self.region_code);
        tokio::spawn(async move {
            if let Some(code) = detect_region_code(&client, &REGION_CODE_ENDPOINTS).await
                && let Ok(mut guard) = slot.write()
            {
                *guard = code;
            }
        })
    }

    async fn search_video_ids(
        &self,
        query: &str,
        key: &str,
        requester: &RequesterInfo,
    ) -> Option<Vec<String>> {
        let url = format!(
            "{}/search?part=snippet&q={}&maxResults={MAX_SEARCH_RESULTS}&key={}&type=video&regionCode={}",
            self.base_url,
            urlencoding::encode(query),
            urlencoding::encode(key),
            urlencoding::encode(&self.region_code()),
        );
        let results: SearchResults = self.get_json(&url, "search", requester).await?;
        Some(
            results
                .items
                .into_iter()
                .filter_map(|item| item.id.video_id)
                .collect(),
        )
    }

    async fn fetch_content_details(
        &self,
        ids: &[String],
        key: &str,
        requester: &RequesterInfo,
    ) -> Option<Vec<ContentItem>> {
        let url = format!(
            "{}/videos?part=contentDetails,snippet&id={}&key={}",
            self.base_url,
            urlencoding::encode(&ids.join(",")),
            urlencoding::encode(key),
        );
        let results: ContentResults = self.get_json(&url, "videos", requester).await?;
        Some(results.items)
    }

    /// GETs `url` and decodes JSON, mapping every failure to `None`.
    ///
    /// `endpoint` is logged instead of `url` so the key never reaches the logs.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        endpoint: &'static str,
        requester: &RequesterInfo,
    ) -> Option<T> {
        debug!(endpoint, "Calling Data API");

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(requester = %requester, endpoint, error = %e, "Data API request failed");
                return None;
            }
        };

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            warn!(requester = %requester, endpoint, "Data API rejected request; quota hit");
            self.quota.mark_exhausted();
            return None;
        }
        if !status.is_success() {
            warn!(
                requester = %requester,
                endpoint,
                status = status.as_u16(),
                "Data API returned an error status"
            );
            return None;
        }

        match response.json::<T>().await {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                error!(
                    requester = %requester,
                    endpoint,
                    error = %e,
                    "Failed to parse Data API response"
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for DataApiStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataApiStrategy")
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .field("region_code", &self.region_code())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SearchStrategy for DataApiStrategy {
    fn name(&self) -> &'static str {
        "data-api"
    }

    fn priority(&self) -> StrategyPriority {
        StrategyPriority::Primary
    }

    fn quota_gated(&self) -> bool {
        true
    }

    #[instrument(skip(self, query, requester), fields(strategy = "data-api", track = %query.id))]
    async fn search(
        &self,
        query: &TrackQuery,
        requester: &RequesterInfo,
    ) -> Option<SearchCandidate> {
        let Some(key) = self.api_key.as_deref() else {
            debug!("No API key configured; skipping Data API search");
            return None;
        };
        let text = query.search_text();

        let ids = self.search_video_ids(&text, key, requester).await?;
        if ids.is_empty() {
            warn!(requester = %requester, query = %text, "Data API search turned up nothing");
            return None;
        }

        let details = self.fetch_content_details(&ids, key, requester).await?;
        let candidates = details.into_iter().filter_map(|item| {
            let Some(duration_ms) = parse_iso8601_duration(&item.content_details.duration) else {
                debug!(video_id = %item.id, duration = %item.content_details.duration, "Skipping video with unparseable duration");
                return None;
            };
            Some(SearchCandidate::new(
                video_link(&item.id),
                duration_ms,
                self.name(),
            ))
        });

        let chosen = select_closest(candidates, query.duration_ms);
        if chosen.is_none() {
            warn!(requester = %requester, query = %text, "Data API details turned up nothing");
        }
        chosen
    }
}

/// Parses an ISO-8601 duration such as `PT3M25S` into milliseconds.
///
/// Returns `None` for anything that is not a day/time duration.
#[must_use]
pub fn parse_iso8601_duration(value: &str) -> Option<u64> {
    let captures = ISO8601_DURATION.captures(value.trim())?;
    let part = |index: usize| -> Option<u64> {
        captures
            .get(index)
            .map_or(Some(0), |m| m.as_str().parse::<u64>().ok())
    };

    let seconds = part(1)?
        .checked_mul(86_400)?
        .checked_add(part(2)?.checked_mul(3_600)?)?
        .checked_add(part(3)?.checked_mul(60)?)?
        .checked_add(part(4)?)?;
    let fraction_ms = captures.get(5).map_or(0, |m| {
        // first three fractional digits, right-padded: ".5" -> 500
        let digits: String = m.as_str().chars().chain("000".chars()).take(3).collect();
        digits.parse::<u64>().unwrap_or(0)
    });

    seconds.checked_mul(1_000)?.checked_add(fraction_ms)
}
