//! C12's compliant-header middleware — the outer tower layer guaranteeing the §4.6 header
//! contract on every response, success or error, including ones the router generates itself
//! (404/405) where no upstream call ever happened.
//!
//! Grounded on the teacher's `middleware::auth::auth_middleware` shape (an `axum::middleware::
//! from_fn` wrapping `Next`), repurposed from authentication gatekeeping to header fabrication —
//! this middleware never rejects a request, it only decorates the response.

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Resolves Open Question (a) (§9): the inbound `X-Request-ID` and the minted `req_` token are
/// the same mechanism, not two. An inbound ID is honored; otherwise one is minted via C1.
pub async fn compliant_headers(request: Request, next: Next) -> Response {
    let inbound_request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut response = next.run(request).await;

    let request_id = inbound_request_id.unwrap_or_else(gateway::id::request_id);
    let headers = response.headers_mut();

    headers.insert(
        REQUEST_ID_HEADER.clone(),
        HeaderValue::from_str(&request_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    // Streaming responses set their own `Cache-Control: no-cache` before this layer runs
    // (§4.6 distinguishes unary from streaming here); don't clobber it.
    if !headers.contains_key("cache-control") {
        headers.insert(
            "cache-control",
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        );
    }
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert("x-xss-protection", HeaderValue::from_static("1; mode=block"));
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert("server", HeaderValue::from_static("Generative-API-Router/1.0"));
    headers.insert("x-powered-by", HeaderValue::from_static("Generative-API-Router"));
    headers.insert(
        "date",
        HeaderValue::from_str(&http_date_now()).unwrap_or_else(|_| HeaderValue::from_static("")),
    );

    response
}

fn http_date_now() -> String {
    chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
