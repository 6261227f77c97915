//! Shared HTTP client and auth utilities.

use std::sync::OnceLock;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::ConductorError;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
///
/// No request timeout is set here; callers bound each decision with their
/// own per-agent deadline.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    })
}

/// Build default headers for a Bearer-token API.
pub fn bearer_headers(api_key: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(key) = api_key {
        if let Ok(val) = HeaderValue::from_str(&format!("Bearer {key}")) {
            headers.insert(AUTHORIZATION, val);
        }
    }
    headers
}

/// Map a non-success HTTP status to an error.
pub fn status_to_error(status: u16, body: &str) -> ConductorError {
    match status {
        401 | 403 => ConductorError::Authentication(body.to_string()),
        429 => ConductorError::RateLimited {
            retry_after_ms: extract_retry_after(body),
        },
        _ => ConductorError::api(status, body),
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
