//! C6 — the upstream HTTP client.
//!
//! Grounded on `inference_providers/src/external/openai_compatible.rs`'s client construction and
//! request-building idiom (base URL + `/chat/completions`, bearer auth, header copy) from the
//! teacher repo, adapted from a provider-specific backend into a single vendor-agnostic client
//! since every upstream this router speaks to is already OpenAI-compatible.

use std::time::Duration;

use bytes::Bytes;
use futures_core::Stream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_ENCODING, AUTHORIZATION};
use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gzip framing error: {0}")]
    Gzip(#[from] std::io::Error),
}

/// The fully-buffered or still-streaming upstream response body, plus the bits of the response
/// the caller needs to finish the job: status, and whether the body is gzip-encoded.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub gzip_encoded: bool,
    pub response: reqwest::Response,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Thin wrapper around a shared `reqwest::Client`. Safe for concurrent use across requests — the
/// client owns its own connection pool.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is valid");
        Self { http }
    }

    #[cfg(test)]
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Sends `body` to `<base_url>/chat/completions`, copying every caller header except
    /// `Accept-Encoding` (the router manages compression end-to-end itself) and overriding
    /// `Authorization` with the selected credential.
    pub async fn send(
        &self,
        base_url: &str,
        caller_headers: &HeaderMap,
        credential_value: &str,
        body: Vec<u8>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        let mut headers = HeaderMap::new();
        for (name, value) in caller_headers.iter() {
            if name == ACCEPT_ENCODING {
                continue;
            }
            headers.insert(name.clone(), value.clone());
        }
        let bearer = format!("Bearer {}", credential_value);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer).unwrap_or_else(|_| HeaderValue::from_static("")),
        );

        tracing::debug!(url = %url, "sending upstream request");
        let response = self
            .http
            .post(&url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let gzip_encoded = response
            .headers()
            .get(reqwest::header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("gzip"))
            .unwrap_or(false);

        Ok(UpstreamResponse {
            status,
            gzip_encoded,
            response,
        })
    }
}

/// Name used to look up `X-Request-ID` without retyping the literal at every call site.
pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

pub type ByteStream = std::pin::Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;
