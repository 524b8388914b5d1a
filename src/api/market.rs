//! Market state endpoints: latest indicator snapshots per instrument.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::error::AppError;
use crate::types::{IndicatorSnapshot, Instrument};
use crate::AppState;

/// API response wrapper.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
    pub timestamp: i64,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_snapshots))
        .route("/instruments", get(list_instruments))
        .route("/:symbol", get(get_snapshot))
}

/// Latest snapshot for every instrument that has produced one.
async fn list_snapshots(State(state): State<AppState>) -> Json<ApiResponse<Vec<IndicatorSnapshot>>> {
    Json(ApiResponse::new(state.engine.all_snapshots()))
}

/// The configured instrument set.
async fn list_instruments(State(state): State<AppState>) -> Json<ApiResponse<Vec<Instrument>>> {
    Json(ApiResponse::new(state.instruments.as_ref().clone()))
}

/// Latest snapshot for one instrument.
async fn get_snapshot(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<IndicatorSnapshot>>, AppError> {
    let symbol = symbol.to_uppercase();
    state
        .engine
        .latest_snapshot(&symbol)
        .map(|snapshot| Json(ApiResponse::new(snapshot)))
        .ok_or_else(|| AppError::NotFound(format!("no snapshot for {}", symbol)))
}
