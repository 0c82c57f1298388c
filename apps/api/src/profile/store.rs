use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;
use tracing::info;

use crate::errors::StoreError;
use crate::models::funnel::FunnelShape;
use crate::models::profile::{SalaryRange, UserProfile};

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, user_id: i64) -> Result<Option<UserProfile>, StoreError>;

    /// Inserts or replaces the profile; returns what was stored.
    async fn upsert(&self, profile: UserProfile) -> Result<UserProfile, StoreError>;
}

pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct ProfileRow {
    user_id: i64,
    role: String,
    level: String,
    current_location: String,
    target_location: String,
    deadline_weeks: i32,
    preferred_funnel_shape: String,
    salary: Option<Json<SalaryRange>>,
    industries: Json<Vec<String>>,
    competencies: Json<Vec<String>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for UserProfile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let preferred_funnel_shape =
            FunnelShape::parse(&row.preferred_funnel_shape).ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "profile {}: bad funnel shape '{}'",
                    row.user_id, row.preferred_funnel_shape
                ))
            })?;
        let deadline_weeks = u32::try_from(row.deadline_weeks).map_err(|_| {
            StoreError::Corrupt(format!(
                "profile {}: negative deadline {}",
                row.user_id, row.deadline_weeks
            ))
        })?;

        Ok(UserProfile {
            user_id: row.user_id,
            role: row.role,
            level: row.level,
            current_location: row.current_location,
            target_location: row.target_location,
            deadline_weeks,
            preferred_funnel_shape,
            salary: row.salary.map(|Json(s)| s),
            industries: row.industries.0,
            competencies: row.competencies.0,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn get(&self, user_id: i64) -> Result<Option<UserProfile>, StoreError> {
        let row: Option<ProfileRow> = sqlx::query_as(
            r#"
            SELECT user_id, role, level, current_location, target_location, deadline_weeks,
                   preferred_funnel_shape, salary, industries, competencies, updated_at
            FROM profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserProfile::try_from).transpose()
    }

    async fn upsert(&self, profile: UserProfile) -> Result<UserProfile, StoreError> {
        let row: ProfileRow = sqlx::query_as(
            r#"
            INSERT INTO profiles (
                user_id, role, level, current_location, target_location, deadline_weeks,
                preferred_funnel_shape, salary, industries, competencies, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                role = EXCLUDED.role,
                level = EXCLUDED.level,
                current_location = EXCLUDED.current_location,
                target_location = EXCLUDED.target_location,
                deadline_weeks = EXCLUDED.deadline_weeks,
                preferred_funnel_shape = EXCLUDED.preferred_funnel_shape,
                salary = EXCLUDED.salary,
                industries = EXCLUDED.industries,
                competencies = EXCLUDED.competencies,
                updated_at = NOW()
            RETURNING user_id, role, level, current_location, target_location, deadline_weeks,
                      preferred_funnel_shape, salary, industries, competencies, updated_at
            "#,
        )
        .bind(profile.user_id)
        .bind(&profile.role)
        .bind(&profile.level)
        .bind(&profile.current_location)
        .bind(&profile.target_location)
        .bind(profile.deadline_weeks as i32)
        .bind(profile.preferred_funnel_shape.as_str())
        .bind(profile.salary.as_ref().map(Json))
        .bind(Json(&profile.industries))
        .bind(Json(&profile.competencies))
        .fetch_one(&self.pool)
        .await?;

        info!("Stored profile for user {}", profile.user_id);
        UserProfile::try_from(row)
    }
}

#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<i64, UserProfile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, user_id: i64) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.profiles.read().await.get(&user_id).cloned())
    }

    async fn upsert(&self, mut profile: UserProfile) -> Result<UserProfile, StoreError> {
        profile.updated_at = Utc::now();
        self.profiles
            .write()
            .await
            .insert(profile.user_id, profile.clone());
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(role: &str) -> UserProfile {
        UserProfile {
            user_id: 5,
            role: role.to_string(),
            level: "Junior".to_string(),
            current_location: "Yerevan".to_string(),
            target_location: "Yerevan".to_string(),
            deadline_weeks: 6,
            preferred_funnel_shape: FunnelShape::Passive,
            salary: Some(SalaryRange {
                min: 2000.0,
                max: 3000.0,
                currency: "USD".to_string(),
                period: "month".to_string(),
            }),
            industries: vec![],
            competencies: vec!["SQL".to_string()],
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_profile() {
        let store = InMemoryProfileStore::new();
        assert!(store.get(5).await.unwrap().is_none());

        store.upsert(profile("QA engineer")).await.unwrap();
        store.upsert(profile("SDET")).await.unwrap();

        let stored = store.get(5).await.unwrap().unwrap();
        assert_eq!(stored.role, "SDET");
        assert_eq!(stored.preferred_funnel_shape, FunnelShape::Passive);
    }

    #[test]
    fn test_row_with_bad_shape_is_corrupt() {
        let row = ProfileRow {
            user_id: 5,
            role: "QA".to_string(),
            level: "Junior".to_string(),
            current_location: "A".to_string(),
            target_location: "B".to_string(),
            deadline_weeks: 4,
            preferred_funnel_shape: "sideways".to_string(),
            salary: None,
            industries: Json(vec![]),
            competencies: Json(vec![]),
            updated_at: Utc::now(),
        };
        assert!(matches!(
            UserProfile::try_from(row),
            Err(StoreError::Corrupt(_))
        ));
    }
}
