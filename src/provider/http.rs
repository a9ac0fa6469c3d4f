//! Shared HTTP client, status mapping and the reqwest transport.

use std::sync::OnceLock;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use tracing::debug;

use super::{HttpRequest, HttpResponse, HttpTransport};
use crate::error::SluiceError;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
///
/// No overall request timeout: a stream stays open as long as the backend
/// keeps writing.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    })
}

/// Map a non-success HTTP status and its body to an error.
///
/// For 429 the retry delay comes from the JSON body when present, otherwise
/// from a `Retry-After` header given in seconds.
pub fn status_to_error(status: u16, headers: &HeaderMap, body: &str) -> SluiceError {
    match status {
        401 | 403 => SluiceError::Authentication(body.to_string()),
        429 => SluiceError::RateLimited {
            retry_after_ms: extract_retry_after(body).or_else(|| retry_after_header(headers)),
        },
        _ => SluiceError::api(status, body),
    }
}

fn extract_retry_after(body: &str) -> Option<u64> {
    // Try to parse retry-after from JSON error body
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|r| r.as_f64())
                .map(|s| (s * 1000.0) as u64)
        })
}

fn retry_after_header(headers: &HeaderMap) -> Option<u64> {
    let seconds = headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()?;
    (seconds >= 0.0).then(|| (seconds * 1000.0) as u64)
}

/// [`HttpTransport`] over reqwest.
///
/// Auth and any other headers are the caller's business; they are sent as
/// given on every request.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    base_url: String,
    headers: HeaderMap,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers,
            client: shared_client().clone(),
        }
    }

    /// Use a specific client instead of the shared one.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SluiceError> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!(url = %url, "Opening stream");

        let mut headers = self.headers.clone();
        headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/json"));

        let resp = self
            .client
            .post(&url)
            .headers(headers)
            .json(&request.body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(SluiceError::from))
            .boxed();

        Ok(HttpResponse {
            status,
            headers,
            body: Some(body),
        })
    }
}
