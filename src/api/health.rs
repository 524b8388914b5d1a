//! Health check endpoint.

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "banshee",
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}
