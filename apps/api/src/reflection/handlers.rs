use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::feedback::FeedbackRecord;
use crate::reflection::form::FormInput;
use crate::reflection::prompts::FormPrompt;
use crate::reflection::service::FormReply;
use crate::state::AppState;

/// GET /api/v1/reflection/:user_id
/// The question the open form is waiting on.
pub async fn handle_current_prompt(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<FormPrompt>, AppError> {
    state
        .reflection
        .current(user_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No open reflection form for user {user_id}")))
}

/// POST /api/v1/reflection/:user_id/input
pub async fn handle_form_input(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(input): Json<FormInput>,
) -> Result<Json<FormReply>, AppError> {
    let reply = state.reflection.apply(user_id, input).await?;
    Ok(Json(reply))
}

/// DELETE /api/v1/reflection/:user_id
/// Abandons the open form; nothing is written.
pub async fn handle_abandon(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if state.reflection.abandon(user_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!(
            "No open reflection form for user {user_id}"
        )))
    }
}

/// Upper bound for `limit` on the feedback endpoint.
pub const MAX_FEEDBACK_LIMIT: usize = 100;

#[derive(Deserialize)]
pub struct FeedbackQuery {
    pub user_id: i64,
    pub limit: Option<usize>,
}

/// GET /api/v1/feedback
pub async fn handle_recent_feedback(
    State(state): State<AppState>,
    Query(params): Query<FeedbackQuery>,
) -> Result<Json<Vec<FeedbackRecord>>, AppError> {
    let limit = match params.limit {
        Some(limit) if !(1..=MAX_FEEDBACK_LIMIT).contains(&limit) => {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {MAX_FEEDBACK_LIMIT}"
            )));
        }
        Some(limit) => limit,
        None => state.config.reflection_history_limit,
    };
    let records = state
        .reflection
        .feedback()
        .recent(params.user_id, limit)
        .await?;
    Ok(Json(records))
}
