//! Shared helpers for the completions route: error→response mapping, outbound gzip compression,
//! and the `X-Vendor-Source` header value — split out so `completions.rs` stays focused on the
//! unary/streaming branch, matching the teacher's `routes/common.rs` (`map_domain_error_to_status`)
//! convention of keeping response-shaping helpers out of the handler body.

use std::io::Write;

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use flate2::write::GzEncoder;
use flate2::Compression;

pub fn error_response(status: StatusCode, message: &str) -> Response {
    (status, message.to_string()).into_response()
}

pub fn vendor_header_value(vendor: &str) -> HeaderValue {
    HeaderValue::from_str(vendor).unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}

const COMPRESSION_HOSTILE_AGENTS: [&str; 3] = ["postman", "insomnia", "paw"];

/// §4.6 client compression rule: gzip the unary body iff the caller accepts gzip and its
/// `User-Agent` isn't one of the tools known to mishandle it. Returns `(payload, content_encoding)`
/// — `content_encoding` is `Some("gzip")` only when compression was applied.
pub fn compress_if_applicable(body: Vec<u8>, caller_headers: &HeaderMap) -> (Vec<u8>, Option<&'static str>) {
    let accepts_gzip = caller_headers
        .get(axum::http::header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("gzip"))
        .unwrap_or(false);

    if !accepts_gzip {
        return (body, None);
    }

    let user_agent_is_hostile = caller_headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|ua| {
            let lower = ua.to_ascii_lowercase();
            COMPRESSION_HOSTILE_AGENTS.iter().any(|agent| lower.contains(agent))
        })
        .unwrap_or(false);

    if user_agent_is_hostile {
        return (body, None);
    }

    match gzip(&body) {
        Ok(compressed) => (compressed, Some("gzip")),
        Err(_) => (body, None),
    }
}

fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}
