//! Shared HTTP client construction policy for search strategies.
//!
//! Every strategy client gets the same timeouts, user agent and compression.
//! Timeouts can be overridden once at startup.

use std::sync::RwLock;
use std::time::Duration;

use reqwest::Client;

use crate::error::SearchError;

/// Default connect timeout for search requests.
pub const SEARCH_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Default overall timeout for search requests.
pub const SEARCH_READ_TIMEOUT_SECS: u64 = 30;

/// Desktop browser user agent sent with search requests.
pub(crate) const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.11; rv:44.0) Gecko/20100101 Firefox/44.0";

#[derive(Debug, Clone, Copy)]
struct SearchHttpTimeouts {
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
}

impl Default for SearchHttpTimeouts {
    fn default() -> Self {
        Self {
            connect_timeout_secs: SEARCH_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: SEARCH_READ_TIMEOUT_SECS,
        }
    }
}

static SEARCH_HTTP_TIMEOUTS: RwLock<SearchHttpTimeouts> = RwLock::new(SearchHttpTimeouts {
    connect_timeout_secs: SEARCH_CONNECT_TIMEOUT_SECS,
    read_timeout_secs: SEARCH_READ_TIMEOUT_SECS,
});

/// Configures HTTP timeouts used by strategy client builders.
///
/// Intended for runtime configuration before strategy construction.
pub fn configure_search_http_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) {
    if let Ok(mut guard) = SEARCH_HTTP_TIMEOUTS.write() {
        *guard = SearchHttpTimeouts {
            connect_timeout_secs,
            read_timeout_secs,
        };
    }
}

fn search_http_timeouts() -> SearchHttpTimeouts {
    SEARCH_HTTP_TIMEOUTS
        .read()
        .map(|guard| *guard)
        .unwrap_or_default()
}

/// Builds a strategy HTTP client using the shared policy.
///
/// `strategy` only appears in errors.
///
/// # Errors
///
/// Returns [`SearchError::ClientBuild`] when client construction fails.
pub(crate) fn build_search_http_client(strategy: &str) -> Result<Client, SearchError> {
    let timeouts = search_http_timeouts();
    Client::builder()
        .connect_timeout(Duration::from_secs(timeouts.connect_timeout_secs))
        .timeout(Duration::from_secs(timeouts.read_timeout_secs))
        .user_agent(BROWSER_USER_AGENT)
        .gzip(true)
        .build()
        .map_err(|e| SearchError::ClientBuild {
            strategy: strategy.to_string(),
            reason: format!("HTTP client construction failed: {e}"),
        })
}
