//! Region-code detection for region-scoped primary searches.

use reqwest::Client;
use tracing::{debug, info, instrument, warn};

/// Region used when detection fails or has not finished yet.
pub const DEFAULT_REGION_CODE: &str = "US";

/// Endpoints answering with the caller's two-letter country code, tried in order.
pub const REGION_CODE_ENDPOINTS: [&str; 3] = [
    "https://ipapi.co/country_code",
    "https://ipwho.is/?fields=country_code&output=csv",
    "http://ip-api.com/line?fields=countryCode",
];

/// Probes `endpoints` in order and returns the first valid two-letter code.
///
/// Returns `None` when every endpoint fails or answers with something else.
#[instrument(skip(client, endpoints), fields(endpoint_count = endpoints.len()))]
pub async fn detect_region_code<S: AsRef<str>>(client: &Client, endpoints: &[S]) -> Option<String> {
    for endpoint in endpoints {
        let endpoint = endpoint.as_ref();
        match fetch_text(client, endpoint).await {
            Ok(body) => {
                if let Some(code) = parse_region_code(&body) {
                    debug!(endpoint, region_code = %code, "Detected region code");
                    return Some(code);
                }
                info!(endpoint, "Region code endpoint returned an unexpected body");
            }
            Err(error) => info!(endpoint, %error, "Failed to acquire region code"),
        }
    }
    warn!(
        fallback = DEFAULT_REGION_CODE,
        "Failed to acquire region code for IP; using fallback"
    );
    None
}

async fn fetch_text(client: &Client, endpoint: &str) -> Result<String, reqwest::Error> {
    client
        .get(endpoint)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
}

fn parse_region_code(body: &str) -> Option<String> {
    let trimmed = body.trim();
    (trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()))
        .then(|| trimmed.to_string())
}
