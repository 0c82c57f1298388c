use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analysis::bundle::{
    build_recommendation_bundle, unique_hypothesis_ids, BundleStatus, FunnelSummary,
    RecommendationBundle,
};
use crate::analysis::problems::{detect_problems, ProblemFlag};
use crate::analysis::prompts::render_recommendation_prompt;
use crate::analysis::recommender::RecommendationOutcome;
use crate::errors::AppError;
use crate::funnel::metrics::{compute_metrics, ConversionMetrics};
use crate::funnel::store::{latest_week_totals, WeeklyTotals};
use crate::models::funnel::FunnelShape;
use crate::models::profile::UserProfile;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AnalysisQuery {
    pub user_id: i64,
    /// Overrides the profile's preferred shape.
    #[serde(default)]
    pub funnel_shape: Option<FunnelShape>,
}

struct Analysis {
    profile: Option<UserProfile>,
    totals: Option<WeeklyTotals>,
    flags: Vec<ProblemFlag>,
}

async fn analyse(
    state: &AppState,
    user_id: i64,
    shape: Option<FunnelShape>,
) -> Result<Analysis, AppError> {
    let profile = state.profiles.get(user_id).await?;
    let shape = shape
        .or_else(|| profile.as_ref().map(|p| p.preferred_funnel_shape))
        .unwrap_or_default();

    let history = state.snapshots.history(user_id).await?;
    let totals = latest_week_totals(&history, shape);
    let flags = totals
        .as_ref()
        .map(|t| detect_problems(&t.snapshot, &state.detector))
        .unwrap_or_default();

    Ok(Analysis {
        profile,
        totals,
        flags,
    })
}

#[derive(Serialize)]
pub struct ProblemsResponse {
    pub status: BundleStatus,
    pub week_start: Option<NaiveDate>,
    pub funnel_shape: Option<FunnelShape>,
    pub metrics: Option<ConversionMetrics>,
    pub problems: Vec<ProblemFlag>,
}

/// GET /api/v1/analysis/problems
pub async fn handle_detect_problems(
    State(state): State<AppState>,
    Query(params): Query<AnalysisQuery>,
) -> Result<Json<ProblemsResponse>, AppError> {
    let analysis = analyse(&state, params.user_id, params.funnel_shape).await?;

    let status = match (&analysis.totals, analysis.flags.is_empty()) {
        (None, _) => BundleStatus::InsufficientData,
        (Some(_), true) => BundleStatus::NoProblems,
        (Some(_), false) => BundleStatus::ProblemsFound,
    };

    Ok(Json(ProblemsResponse {
        status,
        week_start: analysis.totals.as_ref().map(|t| t.week_start),
        funnel_shape: analysis.totals.as_ref().map(|t| t.snapshot.shape()),
        metrics: analysis
            .totals
            .as_ref()
            .map(|t| compute_metrics(&t.snapshot)),
        problems: analysis.flags,
    }))
}

#[derive(Deserialize)]
pub struct RecommendationRequest {
    pub user_id: i64,
    #[serde(default)]
    pub funnel_shape: Option<FunnelShape>,
}

#[derive(Serialize)]
pub struct RecommendationResponse {
    pub status: BundleStatus,
    pub bundle: RecommendationBundle,
    /// Present whenever problems were found, so the text can be used by
    /// hand when no generator answered.
    pub prompt: Option<String>,
    pub recommendations: Option<RecommendationOutcome>,
}

/// POST /api/v1/analysis/recommendations
pub async fn handle_recommendations(
    State(state): State<AppState>,
    Json(req): Json<RecommendationRequest>,
) -> Result<Json<RecommendationResponse>, AppError> {
    let analysis = analyse(&state, req.user_id, req.funnel_shape).await?;
    let recent = state
        .reflection
        .feedback()
        .recent(req.user_id, state.config.reflection_history_limit)
        .await?;

    let bundle = match &analysis.totals {
        None => RecommendationBundle::insufficient(analysis.profile.as_ref(), &recent),
        Some(totals) => {
            let hypotheses = state
                .hypotheses
                .resolve(unique_hypothesis_ids(&analysis.flags));
            build_recommendation_bundle(
                analysis.profile.as_ref(),
                &recent,
                &analysis.flags,
                &hypotheses,
            )
            .with_funnel(FunnelSummary::new(totals, &analysis.flags))
        }
    };

    if !bundle.is_actionable() {
        return Ok(Json(RecommendationResponse {
            status: bundle.status,
            bundle,
            prompt: None,
            recommendations: None,
        }));
    }

    let prompt = render_recommendation_prompt(&bundle);
    let outcome = state.recommender.recommend(&bundle, &prompt).await;
    info!(
        "Recommendations for user {}: {} problems, generator {}",
        req.user_id,
        bundle.problems.len(),
        match outcome {
            RecommendationOutcome::Generated(_) => "answered",
            RecommendationOutcome::Unavailable => "unavailable",
        }
    );

    Ok(Json(RecommendationResponse {
        status: bundle.status,
        bundle,
        prompt: Some(prompt),
        recommendations: Some(outcome),
    }))
}
