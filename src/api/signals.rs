//! Signal endpoints: recent signals, alert gate state, usage counters.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::market::ApiResponse;
use crate::services::alert_gate::AlertRecord;
use crate::services::usage::DailyUsage;
use crate::types::Signal;
use crate::AppState;

const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct SignalsQuery {
    /// Maximum number of signals to return (default 50).
    pub limit: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/recent", get(recent_signals))
        .route("/alerts", get(alert_records))
        .route("/usage", get(usage))
        .route("/:symbol", get(symbol_signals))
}

/// Recently dispatched signals across all instruments, newest first.
async fn recent_signals(
    State(state): State<AppState>,
    Query(query): Query<SignalsQuery>,
) -> Json<ApiResponse<Vec<Signal>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    Json(ApiResponse::new(state.engine.recent_signals(None, limit)))
}

/// Recently dispatched signals for one instrument.
async fn symbol_signals(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<SignalsQuery>,
) -> Json<ApiResponse<Vec<Signal>>> {
    let symbol = symbol.to_uppercase();
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    Json(ApiResponse::new(
        state.engine.recent_signals(Some(&symbol), limit),
    ))
}

/// Alert gate bookkeeping per fingerprint.
async fn alert_records(State(state): State<AppState>) -> Json<ApiResponse<Vec<AlertRecord>>> {
    Json(ApiResponse::new(state.engine.alert_records()))
}

/// Daily usage counters.
async fn usage(State(state): State<AppState>) -> Json<ApiResponse<DailyUsage>> {
    Json(ApiResponse::new(state.engine.usage()))
}
