use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::models::funnel::{FunnelShape, MAX_COUNTER};

/// Errors raised by the snapshot, feedback and profile stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Counter delta is {delta:?} but the row is {key:?}")]
    ShapeMismatch { key: FunnelShape, delta: FunnelShape },

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Adding the delta would push a counter past `MAX_COUNTER`.
    #[error("Counter overflow for channel '{channel}'")]
    CounterOverflow { channel: String },
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Rejected form input. The form state is unchanged; `prompt` is the
    /// question to ask again.
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        prompt: Option<Value>,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut prompt = None;
        let (status, code, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            AppError::InvalidInput {
                message,
                prompt: current,
            } => {
                prompt = current;
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_INPUT", message)
            }
            AppError::Store(StoreError::ShapeMismatch { key, delta }) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!(
                    "Counters for a {} funnel cannot be added to a {} funnel row",
                    delta.as_str(),
                    key.as_str()
                ),
            ),
            AppError::Store(StoreError::CounterOverflow { channel }) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("Counters for channel '{channel}' would exceed {MAX_COUNTER}"),
            ),
            AppError::Store(StoreError::Database(e)) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(prompt) = prompt {
            error["prompt"] = prompt;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
