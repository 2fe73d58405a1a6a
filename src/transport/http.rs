//! HTTP client construction, headers and status mapping.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use tracing::warn;

use crate::config::TetherConfig;
use crate::error::{Result, TetherError};

/// Build the HTTP client for one adapter.
pub fn build_client(config: &TetherConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout())
        .pool_max_idle_per_host(4);
    if let Some(timeout) = config.request_timeout() {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

/// Headers for a streaming run request.
pub fn run_headers(config: &TetherConfig) -> HeaderMap {
    let mut headers = base_headers(config);
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    headers
}

/// Headers shared by every request: JSON body, auth and configured extras.
pub fn base_headers(config: &TetherConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(key) = &config.api_key {
        if let Ok(val) = HeaderValue::from_str(&format!("Bearer {key}")) {
            headers.insert(AUTHORIZATION, val);
        }
    }
    for (name, value) in &config.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = name.as_str(), "skipping invalid header"),
        }
    }
    headers
}

/// Map a non-success status and body to an error.
pub fn status_to_error(status: u16, body: &str) -> TetherError {
    match status {
        401 | 403 => TetherError::Authentication(body.to_string()),
        429 => TetherError::RateLimited {
            retry_after_ms: extract_retry_after(body),
        },
        _ => TetherError::api(status, body),
    }
}

fn extract_retry_after(body: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|r| r.as_f64())
                .map(|s| (s * 1000.0) as u64)
        })
}
