use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AppError;
use crate::funnel::metrics::{compute_metrics, ConversionMetrics};
use crate::funnel::triggers::{detect_changes, ChangedSection};
use crate::models::funnel::{
    week_start_of, CounterSnapshot, FunnelShape, SnapshotKey, SnapshotRow, MAX_COUNTER,
};
use crate::reflection::form::FormContext;
use crate::reflection::service::ReflectionOffer;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct EntryRequest {
    pub user_id: i64,
    /// Any day of the target week; defaults to today.
    #[serde(default)]
    pub week_start: Option<NaiveDate>,
    pub channel: String,
    /// Amounts to add. The `funnel_shape` tag picks the row.
    pub counters: CounterSnapshot,
}

#[derive(Serialize)]
pub struct EntryResponse {
    pub key: SnapshotKey,
    pub old: Option<CounterSnapshot>,
    pub new: CounterSnapshot,
    pub metrics: ConversionMetrics,
    pub changed_sections: Vec<ChangedSection>,
    pub reflection: ReflectionOffer,
}

fn snapshot_key(
    user_id: i64,
    week: Option<NaiveDate>,
    channel: &str,
    funnel_shape: FunnelShape,
) -> Result<SnapshotKey, AppError> {
    let channel = channel.trim();
    if channel.is_empty() {
        return Err(AppError::Validation("channel must not be empty".to_string()));
    }
    Ok(SnapshotKey {
        user_id,
        week_start: week_start_of(week.unwrap_or_else(|| Utc::now().date_naive())),
        channel: channel.to_string(),
        funnel_shape,
    })
}

/// POST /api/v1/funnel/entries
/// Adds the counters to the week's row, then offers a reflection form for
/// every event counter that went up.
pub async fn handle_add_entry(
    State(state): State<AppState>,
    Json(req): Json<EntryRequest>,
) -> Result<Json<EntryResponse>, AppError> {
    let key = snapshot_key(
        req.user_id,
        req.week_start,
        &req.channel,
        req.counters.shape(),
    )?;
    if req.counters.largest() > MAX_COUNTER {
        return Err(AppError::Validation(format!(
            "counter values must not exceed {MAX_COUNTER}"
        )));
    }

    let outcome = state.snapshots.merge_add(&key, &req.counters).await?;
    let changed_sections = detect_changes(outcome.old.as_ref(), &outcome.new);
    let metrics = compute_metrics(&outcome.new);
    debug!(
        "User {} changed {} sections in '{}'",
        key.user_id,
        changed_sections.len(),
        key.channel
    );

    let reflection = state
        .reflection
        .offer(
            FormContext {
                user_id: key.user_id,
                week_start: key.week_start,
                channel: key.channel.clone(),
                funnel_shape: key.funnel_shape,
            },
            changed_sections.clone(),
        )
        .await;

    Ok(Json(EntryResponse {
        key,
        old: outcome.old,
        new: outcome.new,
        metrics,
        changed_sections,
        reflection,
    }))
}

#[derive(Deserialize)]
pub struct SnapshotQuery {
    pub user_id: i64,
    pub channel: String,
    #[serde(default)]
    pub week_start: Option<NaiveDate>,
    #[serde(default)]
    pub funnel_shape: FunnelShape,
}

#[derive(Serialize)]
pub struct SnapshotResponse {
    pub key: SnapshotKey,
    /// False when nothing was recorded yet; `snapshot` is then all zero.
    pub exists: bool,
    pub snapshot: CounterSnapshot,
    pub metrics: ConversionMetrics,
}

/// GET /api/v1/funnel/snapshot
pub async fn handle_get_snapshot(
    State(state): State<AppState>,
    Query(params): Query<SnapshotQuery>,
) -> Result<Json<SnapshotResponse>, AppError> {
    let key = snapshot_key(
        params.user_id,
        params.week_start,
        &params.channel,
        params.funnel_shape,
    )?;
    let stored = state.snapshots.get(&key).await?;
    let snapshot = stored.unwrap_or_else(|| CounterSnapshot::empty(key.funnel_shape));

    Ok(Json(SnapshotResponse {
        exists: stored.is_some(),
        metrics: compute_metrics(&snapshot),
        snapshot,
        key,
    }))
}

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: i64,
}

#[derive(Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub row: SnapshotRow,
    pub metrics: ConversionMetrics,
}

/// GET /api/v1/funnel/history
pub async fn handle_get_history(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<HistoryEntry>>, AppError> {
    let rows = state.snapshots.history(params.user_id).await?;
    Ok(Json(
        rows.into_iter()
            .map(|row| HistoryEntry {
                metrics: compute_metrics(&row.snapshot),
                row,
            })
            .collect(),
    ))
}
