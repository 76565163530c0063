//! C2 — media fetcher.
//!
//! Grounded on `inference_providers/src/external/openai_compatible.rs`'s `reqwest::Client`
//! construction style (explicit connect/read timeouts) and `external/backend.rs`'s
//! `BackendConfig` for the timeout/size-bound shape, adapted from "call one configured upstream"
//! to "fetch one caller-supplied URL under bounds".

use std::collections::HashMap;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};

pub const USER_AGENT_VALUE: &str = "Generative-API-Router/1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    File,
    Audio,
}

impl MediaKind {
    pub fn timeout(self) -> Duration {
        match self {
            MediaKind::Image => Duration::from_secs(120),
            MediaKind::File => Duration::from_secs(120),
            MediaKind::Audio => Duration::from_secs(60),
        }
    }

    pub fn size_limit(self) -> usize {
        match self {
            MediaKind::Image => 20 * 1024 * 1024,
            MediaKind::File => 20 * 1024 * 1024,
            MediaKind::Audio => 25 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("unsupported scheme")]
    UnsupportedScheme,
    #[error("size exceeds limit")]
    SizeExceeded,
    #[error("status {0}")]
    Status(u16),
    #[error("timeout")]
    Timeout,
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
}

/// Downloads `url` with `headers` applied on top of a default `User-Agent`, bounded by `kind`'s
/// size and time limits (§4.2). Only `http://`/`https://` (lowercase, case-sensitive per the
/// source) are accepted.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    headers: &HashMap<String, String>,
    kind: MediaKind,
) -> Result<FetchedMedia, FetchError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(FetchError::UnsupportedScheme);
    }

    let mut header_map = HeaderMap::new();
    header_map.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            header_map.insert(name, value);
        }
    }

    let request = client.get(url).headers(header_map);
    let response = tokio::time::timeout(kind.timeout(), request.send())
        .await
        .map_err(|_| FetchError::Timeout)??;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let limit = kind.size_limit();
    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = tokio::time::timeout(kind.timeout(), stream.next())
        .await
        .map_err(|_| FetchError::Timeout)?
    {
        let chunk = chunk?;
        if bytes.len() + chunk.len() > limit {
            return Err(FetchError::SizeExceeded);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(FetchedMedia { bytes, content_type })
}
