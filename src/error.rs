use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Engine-level failure modes. None of these is fatal to the process;
/// every one degrades a single pipeline step and the loop continues.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("insufficient history for {0}")]
    InsufficientData(String),

    #[error("stale observation for {symbol}: {timestamp} <= {last_accepted}")]
    StaleObservation {
        symbol: String,
        timestamp: i64,
        last_accepted: i64,
    },

    #[error("advisory unavailable: {0}")]
    AdvisoryUnavailable(String),

    #[error("{0} budget exhausted")]
    BudgetExhausted(&'static str),

    #[error("sink delivery failed: {0}")]
    SinkDeliveryFailed(String),
}

/// HTTP layer error types.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Anyhow(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
