use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::funnel::FunnelShape;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SalaryRange {
    pub min: f64,
    pub max: f64,
    pub currency: String,
    /// "month" or "year"
    pub period: String,
}

/// Candidate profile used to personalise recommendations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub user_id: i64,
    pub role: String,
    pub level: String,
    pub current_location: String,
    pub target_location: String,
    pub deadline_weeks: u32,
    #[serde(default)]
    pub preferred_funnel_shape: FunnelShape,
    #[serde(default)]
    pub salary: Option<SalaryRange>,
    #[serde(default)]
    pub industries: Vec<String>,
    #[serde(default)]
    pub competencies: Vec<String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}
