use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::profile::UserProfile;
use crate::state::AppState;

/// Ten years; anything longer is a typo.
pub const MAX_DEADLINE_WEEKS: u32 = 520;

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: i64,
}

/// GET /api/v1/profile
pub async fn handle_get_profile(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<UserProfile>, AppError> {
    state
        .profiles
        .get(params.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Profile for user {} not found", params.user_id)))
}

/// PUT /api/v1/profile
pub async fn handle_put_profile(
    State(state): State<AppState>,
    Json(profile): Json<UserProfile>,
) -> Result<Json<UserProfile>, AppError> {
    if profile.role.trim().is_empty() {
        return Err(AppError::Validation("role must not be empty".to_string()));
    }
    if profile.deadline_weeks > MAX_DEADLINE_WEEKS {
        return Err(AppError::Validation(format!(
            "deadline_weeks must not exceed {MAX_DEADLINE_WEEKS}"
        )));
    }
    if let Some(salary) = &profile.salary {
        if salary.min > salary.max {
            return Err(AppError::Validation(
                "salary.min must not exceed salary.max".to_string(),
            ));
        }
    }
    let stored = state.profiles.upsert(profile).await?;
    Ok(Json(stored))
}
