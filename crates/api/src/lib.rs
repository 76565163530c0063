//! HTTP surface (C12): axum router assembly, the compliant-header middleware, and process
//! bootstrap (`main.rs`). Everything that decides vendor routing, rewriting, and normalization
//! lives one layer down in `gateway`; this crate only wires that core up to a socket.

pub mod logging;
pub mod middleware;
pub mod routes;

use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use routes::completions::{chat_completions, AppState};
use routes::health::health_check;

/// Assembles the full router: both completions route spellings (§4.12 — `/chat/completions` for
/// SDKs that already bake `/v1` into their base URL, `/v1/chat/completions` for those that don't),
/// `/health` outside `/v1` for container probes, a permissive CORS layer (see DESIGN.md's CORS
/// posture decision — this gateway has no session for an origin allow-list to protect, unlike the
/// teacher's `is_origin_allowed` predicate), and the compliant-header middleware as the outermost
/// layer so it runs on every response including ones the router itself generates (404/405).
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    let completion_routes = Router::new()
        .route("/chat/completions", post(chat_completions))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state);

    Router::new()
        .merge(completion_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(from_fn(middleware::compliant_headers))
}
