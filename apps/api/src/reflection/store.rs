use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::feedback::{FeedbackRecord, RejectReason, RejectSubType};
use crate::models::funnel::{EventStage, FunnelShape};

/// Append-only log of completed reflection sections.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Writes every record or none of them.
    async fn append_all(&self, records: &[FeedbackRecord]) -> Result<(), StoreError>;

    /// Most recent records of a user, newest first.
    async fn recent(&self, user_id: i64, limit: usize) -> Result<Vec<FeedbackRecord>, StoreError>;
}

// ── Postgres ────────────────────────────────────────────────────────────────

pub struct PgFeedbackStore {
    pool: PgPool,
}

impl PgFeedbackStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct FeedbackRow {
    id: Uuid,
    form_run_id: Uuid,
    user_id: i64,
    funnel_shape: String,
    channel: String,
    week_start: NaiveDate,
    stage: String,
    events_count: i32,
    rating_overall: i16,
    strengths: Option<String>,
    weaknesses: Option<String>,
    rating_mood: i16,
    reject_sub_type: Option<String>,
    reject_reasons: Option<Json<Vec<RejectReason>>>,
    reject_reason_other: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<FeedbackRow> for FeedbackRecord {
    type Error = StoreError;

    fn try_from(row: FeedbackRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str, value: &str| {
            StoreError::Corrupt(format!("event_feedback {}: bad {field} '{value}'", row.id))
        };
        let funnel_shape = FunnelShape::parse(&row.funnel_shape)
            .ok_or_else(|| corrupt("funnel_shape", &row.funnel_shape))?;
        let stage = EventStage::parse(&row.stage).ok_or_else(|| corrupt("stage", &row.stage))?;
        let reject_sub_type = match row.reject_sub_type.as_deref() {
            Some(value) => {
                Some(RejectSubType::parse(value).ok_or_else(|| corrupt("reject_sub_type", value))?)
            }
            None => None,
        };
        let narrow = |field: &str, value: i64| -> Result<u32, StoreError> {
            u32::try_from(value).map_err(|_| corrupt(field, &value.to_string()))
        };

        Ok(FeedbackRecord {
            id: row.id,
            form_run_id: row.form_run_id,
            user_id: row.user_id,
            funnel_shape,
            channel: row.channel,
            week_start: row.week_start,
            stage,
            events_count: narrow("events_count", row.events_count as i64)?,
            rating_overall: narrow("rating_overall", row.rating_overall as i64)? as u8,
            strengths: row.strengths,
            weaknesses: row.weaknesses,
            rating_mood: narrow("rating_mood", row.rating_mood as i64)? as u8,
            reject_sub_type,
            reject_reasons: row
                .reject_reasons
                .map(|Json(reasons)| reasons.into_iter().collect::<BTreeSet<_>>()),
            reject_reason_other: row.reject_reason_other,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl FeedbackStore for PgFeedbackStore {
    async fn append_all(&self, records: &[FeedbackRecord]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            let reasons = record
                .reject_reasons
                .as_ref()
                .map(|set| Json(set.iter().copied().collect::<Vec<_>>()));

            sqlx::query(
                r#"
                INSERT INTO event_feedback (
                    id, form_run_id, user_id, funnel_shape, channel, week_start,
                    stage, events_count, rating_overall, strengths, weaknesses,
                    rating_mood, reject_sub_type, reject_reasons, reject_reason_other,
                    created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                "#,
            )
            .bind(record.id)
            .bind(record.form_run_id)
            .bind(record.user_id)
            .bind(record.funnel_shape.as_str())
            .bind(&record.channel)
            .bind(record.week_start)
            .bind(record.stage.as_str())
            .bind(record.events_count as i32)
            .bind(record.rating_overall as i16)
            .bind(&record.strengths)
            .bind(&record.weaknesses)
            .bind(record.rating_mood as i16)
            .bind(record.reject_sub_type.map(|s| s.as_str()))
            .bind(reasons)
            .bind(&record.reject_reason_other)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        if let Some(first) = records.first() {
            info!(
                "Stored {} feedback records for user {} (run {})",
                records.len(),
                first.user_id,
                first.form_run_id
            );
        }
        Ok(())
    }

    async fn recent(&self, user_id: i64, limit: usize) -> Result<Vec<FeedbackRecord>, StoreError> {
        let rows: Vec<FeedbackRow> = sqlx::query_as(
            r#"
            SELECT id, form_run_id, user_id, funnel_shape, channel, week_start,
                   stage, events_count, rating_overall, strengths, weaknesses,
                   rating_mood, reject_sub_type, reject_reasons, reject_reason_other,
                   created_at
            FROM event_feedback
            WHERE user_id = $1
            ORDER BY created_at DESC, id
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FeedbackRecord::try_from).collect()
    }
}

// ── In-memory ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryFeedbackStore {
    records: RwLock<Vec<FeedbackRecord>>,
}

impl InMemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedbackStore for InMemoryFeedbackStore {
    async fn append_all(&self, records: &[FeedbackRecord]) -> Result<(), StoreError> {
        self.records.write().await.extend_from_slice(records);
        Ok(())
    }

    async fn recent(&self, user_id: i64, limit: usize) -> Result<Vec<FeedbackRecord>, StoreError> {
        let records = self.records.read().await;
        // Insertion order breaks ties between records of the same run.
        let mut mine: Vec<(usize, &FeedbackRecord)> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.user_id == user_id)
            .collect();
        mine.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));
        Ok(mine.into_iter().take(limit).map(|(_, r)| r.clone()).collect())
    }
}

/// Rejects every write. Used to exercise the all-or-nothing path.
#[cfg(test)]
pub struct FailingFeedbackStore;

#[cfg(test)]
#[async_trait]
impl FeedbackStore for FailingFeedbackStore {
    async fn append_all(&self, _records: &[FeedbackRecord]) -> Result<(), StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn recent(&self, _user_id: i64, _limit: usize) -> Result<Vec<FeedbackRecord>, StoreError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn record(user_id: i64, minutes_ago: i64, stage: EventStage) -> FeedbackRecord {
        FeedbackRecord {
            id: Uuid::new_v4(),
            form_run_id: Uuid::new_v4(),
            user_id,
            funnel_shape: FunnelShape::Active,
            channel: "LinkedIn".to_string(),
            week_start: NaiveDate::from_ymd_opt(2025, 1, 20).unwrap(),
            stage,
            events_count: 1,
            rating_overall: 3,
            strengths: None,
            weaknesses: None,
            rating_mood: 3,
            reject_sub_type: None,
            reject_reasons: None,
            reject_reason_other: None,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn test_recent_is_newest_first_and_limited() {
        let store = InMemoryFeedbackStore::new();
        for r in [
            record(1, 30, EventStage::Response),
            record(1, 10, EventStage::Offer),
            record(2, 0, EventStage::Screening),
            record(1, 20, EventStage::Onsite),
        ] {
            store.append_all(&[r]).await.unwrap();
        }

        let recent = store.recent(1, 2).await.unwrap();
        let stages: Vec<_> = recent.iter().map(|r| r.stage).collect();
        assert_eq!(stages, vec![EventStage::Offer, EventStage::Onsite]);
    }

    #[tokio::test]
    async fn test_failing_store_writes_nothing() {
        let store = FailingFeedbackStore;
        let result = store.append_all(&[record(1, 0, EventStage::Offer)]).await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }

    #[test]
    fn test_row_with_unknown_stage_is_corrupt() {
        let row = FeedbackRow {
            id: Uuid::new_v4(),
            form_run_id: Uuid::new_v4(),
            user_id: 1,
            funnel_shape: "active".to_string(),
            channel: "LinkedIn".to_string(),
            week_start: NaiveDate::from_ymd_opt(2025, 1, 20).unwrap(),
            stage: "ghosted".to_string(),
            events_count: 1,
            rating_overall: 3,
            strengths: None,
            weaknesses: None,
            rating_mood: 3,
            reject_sub_type: None,
            reject_reasons: None,
            reject_reason_other: None,
            created_at: Utc::now(),
        };
        assert!(matches!(
            FeedbackRecord::try_from(row),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_row_reasons_become_a_set() {
        let row = FeedbackRow {
            id: Uuid::new_v4(),
            form_run_id: Uuid::new_v4(),
            user_id: 1,
            funnel_shape: "passive".to_string(),
            channel: "Inbound".to_string(),
            week_start: NaiveDate::from_ymd_opt(2025, 1, 20).unwrap(),
            stage: "rejection".to_string(),
            events_count: 2,
            rating_overall: 2,
            strengths: None,
            weaknesses: Some("weak on pricing".to_string()),
            rating_mood: 1,
            reject_sub_type: Some("after_recruiter_screen".to_string()),
            reject_reasons: Some(Json(vec![RejectReason::Salary, RejectReason::Skill])),
            reject_reason_other: None,
            created_at: Utc::now(),
        };
        let record = FeedbackRecord::try_from(row).unwrap();
        assert_eq!(record.funnel_shape, FunnelShape::Passive);
        assert_eq!(record.reject_sub_type, Some(RejectSubType::AfterRecruiterScreen));
        assert_eq!(
            record.reject_reasons,
            Some(BTreeSet::from([RejectReason::Skill, RejectReason::Salary]))
        );
    }
}
