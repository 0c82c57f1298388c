use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::errors::StoreError;
use crate::models::funnel::{
    ActiveCounters, CounterSnapshot, FunnelShape, PassiveCounters, SnapshotKey, SnapshotRow,
    MAX_COUNTER,
};

/// Result of an additive write: the row before and after, read atomically.
#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    /// `None` when the write created the row.
    pub old: Option<CounterSnapshot>,
    pub new: CounterSnapshot,
}

/// Weekly counter rows keyed by (user, week, channel, shape).
///
/// `merge_add` must be a single atomic read-modify-write: concurrent writes
/// to the same key may never lose an increment.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get(&self, key: &SnapshotKey) -> Result<Option<CounterSnapshot>, StoreError>;

    async fn merge_add(
        &self,
        key: &SnapshotKey,
        delta: &CounterSnapshot,
    ) -> Result<MergeOutcome, StoreError>;

    /// All rows of a user, newest week first, then by channel.
    async fn history(&self, user_id: i64) -> Result<Vec<SnapshotRow>, StoreError>;
}

fn check_shape(key: &SnapshotKey, delta: &CounterSnapshot) -> Result<(), StoreError> {
    if key.funnel_shape != delta.shape() {
        return Err(StoreError::ShapeMismatch {
            key: key.funnel_shape,
            delta: delta.shape(),
        });
    }
    Ok(())
}

/// Sum of every channel of the most recent week for one shape.
#[derive(Debug, Clone, Serialize)]
pub struct WeeklyTotals {
    pub week_start: NaiveDate,
    pub channels: usize,
    pub snapshot: CounterSnapshot,
}

pub fn latest_week_totals(rows: &[SnapshotRow], shape: FunnelShape) -> Option<WeeklyTotals> {
    let latest = rows
        .iter()
        .filter(|r| r.snapshot.shape() == shape)
        .map(|r| r.week_start)
        .max()?;

    let mut totals = CounterSnapshot::empty(shape);
    let mut channels = 0;
    for row in rows
        .iter()
        .filter(|r| r.week_start == latest && r.snapshot.shape() == shape)
    {
        if let Some(sum) = totals.checked_add(&row.snapshot) {
            totals = sum;
            channels += 1;
        }
    }

    Some(WeeklyTotals {
        week_start: latest,
        channels,
        snapshot: totals,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// PostgreSQL
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, FromRow)]
struct WeekCountersRow {
    user_id: i64,
    week_start: NaiveDate,
    channel: String,
    funnel_shape: String,
    applications: i32,
    responses: i32,
    views: i32,
    inbound: i32,
    screenings: i32,
    onsites: i32,
    offers: i32,
    rejections: i32,
}

#[derive(Debug, FromRow)]
struct MergedRow {
    #[sqlx(flatten)]
    counters: WeekCountersRow,
    inserted: bool,
}

fn from_db(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn to_db(value: u32, channel: &str) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::CounterOverflow {
        channel: channel.to_string(),
    })
}

/// Postgres `numeric_value_out_of_range`, raised when an increment overflows
/// an INTEGER column.
const PG_OUT_OF_RANGE: &str = "22003";

fn is_out_of_range(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == PG_OUT_OF_RANGE)
}

impl WeekCountersRow {
    fn snapshot(&self) -> Result<CounterSnapshot, StoreError> {
        match FunnelShape::parse(&self.funnel_shape) {
            Some(FunnelShape::Active) => Ok(CounterSnapshot::Active(ActiveCounters {
                applications: from_db(self.applications),
                responses: from_db(self.responses),
                screenings: from_db(self.screenings),
                onsites: from_db(self.onsites),
                offers: from_db(self.offers),
                rejections: from_db(self.rejections),
            })),
            Some(FunnelShape::Passive) => Ok(CounterSnapshot::Passive(PassiveCounters {
                views: from_db(self.views),
                inbound: from_db(self.inbound),
                screenings: from_db(self.screenings),
                onsites: from_db(self.onsites),
                offers: from_db(self.offers),
                rejections: from_db(self.rejections),
            })),
            None => Err(StoreError::Corrupt(format!(
                "unknown funnel_shape '{}'",
                self.funnel_shape
            ))),
        }
    }

    fn into_snapshot_row(self) -> Result<SnapshotRow, StoreError> {
        let snapshot = self.snapshot()?;
        Ok(SnapshotRow {
            user_id: self.user_id,
            week_start: self.week_start,
            channel: self.channel,
            snapshot,
        })
    }
}

/// Column values for all eight counters; the other shape's columns are zero.
fn columns(snapshot: &CounterSnapshot, channel: &str) -> Result<[i32; 8], StoreError> {
    let db = |value: u32| to_db(value, channel);
    Ok(match snapshot {
        CounterSnapshot::Active(c) => [
            db(c.applications)?,
            db(c.responses)?,
            0,
            0,
            db(c.screenings)?,
            db(c.onsites)?,
            db(c.offers)?,
            db(c.rejections)?,
        ],
        CounterSnapshot::Passive(c) => [
            0,
            0,
            db(c.views)?,
            db(c.inbound)?,
            db(c.screenings)?,
            db(c.onsites)?,
            db(c.offers)?,
            db(c.rejections)?,
        ],
    })
}

const SELECT_COLUMNS: &str = "user_id, week_start, channel, funnel_shape, applications, \
    responses, views, inbound, screenings, onsites, offers, rejections";

#[derive(Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn get(&self, key: &SnapshotKey) -> Result<Option<CounterSnapshot>, StoreError> {
        let row: Option<WeekCountersRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM week_counters \
             WHERE user_id = $1 AND week_start = $2 AND channel = $3 AND funnel_shape = $4"
        ))
        .bind(key.user_id)
        .bind(key.week_start)
        .bind(&key.channel)
        .bind(key.funnel_shape.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.snapshot()).transpose()
    }

    async fn merge_add(
        &self,
        key: &SnapshotKey,
        delta: &CounterSnapshot,
    ) -> Result<MergeOutcome, StoreError> {
        check_shape(key, delta)?;
        let [applications, responses, views, inbound, screenings, onsites, offers, rejections] =
            columns(delta, &key.channel)?;

        // Single upsert-with-increment; `xmax = 0` is true only for a fresh insert.
        let merged: MergedRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO week_counters
                (user_id, week_start, channel, funnel_shape, applications, responses,
                 views, inbound, screenings, onsites, offers, rejections)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (user_id, week_start, channel, funnel_shape) DO UPDATE SET
                applications = week_counters.applications + EXCLUDED.applications,
                responses = week_counters.responses + EXCLUDED.responses,
                views = week_counters.views + EXCLUDED.views,
                inbound = week_counters.inbound + EXCLUDED.inbound,
                screenings = week_counters.screenings + EXCLUDED.screenings,
                onsites = week_counters.onsites + EXCLUDED.onsites,
                offers = week_counters.offers + EXCLUDED.offers,
                rejections = week_counters.rejections + EXCLUDED.rejections,
                updated_at = now()
            RETURNING {SELECT_COLUMNS}, (xmax = 0) AS inserted
            "#
        ))
        .bind(key.user_id)
        .bind(key.week_start)
        .bind(&key.channel)
        .bind(key.funnel_shape.as_str())
        .bind(applications)
        .bind(responses)
        .bind(views)
        .bind(inbound)
        .bind(screenings)
        .bind(onsites)
        .bind(offers)
        .bind(rejections)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_out_of_range(&e) {
                StoreError::CounterOverflow {
                    channel: key.channel.clone(),
                }
            } else {
                StoreError::Database(e)
            }
        })?;

        let new = merged.counters.snapshot()?;
        let old = if merged.inserted {
            None
        } else {
            new.checked_sub(delta)
        };

        info!(
            "Merged counters for user {} week {} channel '{}' ({})",
            key.user_id,
            key.week_start,
            key.channel,
            key.funnel_shape.as_str()
        );

        Ok(MergeOutcome { old, new })
    }

    async fn history(&self, user_id: i64) -> Result<Vec<SnapshotRow>, StoreError> {
        let rows: Vec<WeekCountersRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM week_counters WHERE user_id = $1 \
             ORDER BY week_start DESC, channel ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        debug!("Loaded {} counter rows for user {user_id}", rows.len());
        rows.into_iter().map(|r| r.into_snapshot_row()).collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory
// ────────────────────────────────────────────────────────────────────────────

/// Process-local store for ephemeral mode and tests. The write lock is held
/// across the read-modify-write, which makes `merge_add` atomic.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    rows: RwLock<HashMap<SnapshotKey, CounterSnapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn get(&self, key: &SnapshotKey) -> Result<Option<CounterSnapshot>, StoreError> {
        Ok(self.rows.read().await.get(key).copied())
    }

    async fn merge_add(
        &self,
        key: &SnapshotKey,
        delta: &CounterSnapshot,
    ) -> Result<MergeOutcome, StoreError> {
        check_shape(key, delta)?;
        let mut rows = self.rows.write().await;
        let old = rows.get(key).copied();
        let base = old.unwrap_or_else(|| CounterSnapshot::empty(key.funnel_shape));
        // Shapes already match, so `None` means overflow.
        let new = base
            .checked_add(delta)
            .filter(|sum| sum.largest() <= MAX_COUNTER)
            .ok_or_else(|| StoreError::CounterOverflow {
                channel: key.channel.clone(),
            })?;
        rows.insert(key.clone(), new);
        Ok(MergeOutcome { old, new })
    }

    async fn history(&self, user_id: i64) -> Result<Vec<SnapshotRow>, StoreError> {
        let rows = self.rows.read().await;
        let mut history: Vec<SnapshotRow> = rows
            .iter()
            .filter(|(key, _)| key.user_id == user_id)
            .map(|(key, snapshot)| SnapshotRow {
                user_id: key.user_id,
                week_start: key.week_start,
                channel: key.channel.clone(),
                snapshot: *snapshot,
            })
            .collect();
        history.sort_by(|a, b| {
            b.week_start
                .cmp(&a.week_start)
                .then_with(|| a.channel.cmp(&b.channel))
                .then_with(|| a.snapshot.shape().as_str().cmp(b.snapshot.shape().as_str()))
        });
        Ok(history)
    }
}
