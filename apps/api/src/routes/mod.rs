pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::analysis::handlers as analysis;
use crate::funnel::handlers as funnel;
use crate::profile::handlers as profile;
use crate::reflection::handlers as reflection;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Counters
        .route("/api/v1/funnel/entries", post(funnel::handle_add_entry))
        .route("/api/v1/funnel/snapshot", get(funnel::handle_get_snapshot))
        .route("/api/v1/funnel/history", get(funnel::handle_get_history))
        // Reflection forms
        .route(
            "/api/v1/reflection/:user_id",
            get(reflection::handle_current_prompt).delete(reflection::handle_abandon),
        )
        .route(
            "/api/v1/reflection/:user_id/input",
            post(reflection::handle_form_input),
        )
        .route("/api/v1/feedback", get(reflection::handle_recent_feedback))
        // Analysis
        .route(
            "/api/v1/analysis/problems",
            get(analysis::handle_detect_problems),
        )
        .route(
            "/api/v1/analysis/recommendations",
            post(analysis::handle_recommendations),
        )
        // Profile
        .route(
            "/api/v1/profile",
            get(profile::handle_get_profile).put(profile::handle_put_profile),
        )
        .with_state(state)
}
