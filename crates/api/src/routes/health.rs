//! `GET /health` — container liveness probe, no upstream dependency (§4.12).

use axum::response::Json as ResponseJson;
use serde_json::{json, Value};

pub async fn health_check() -> ResponseJson<Value> {
    ResponseJson(json!({ "status": "ok" }))
}
