use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::funnel::{EventStage, FunnelShape};

/// At which point of the process a rejection happened.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectSubType {
    NoInterview,
    AfterRecruiterScreen,
    AfterTechnicalInterview,
}

impl RejectSubType {
    pub const ALL: [RejectSubType; 3] = [
        RejectSubType::NoInterview,
        RejectSubType::AfterRecruiterScreen,
        RejectSubType::AfterTechnicalInterview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectSubType::NoInterview => "no_interview",
            RejectSubType::AfterRecruiterScreen => "after_recruiter_screen",
            RejectSubType::AfterTechnicalInterview => "after_technical_interview",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RejectSubType::NoInterview => "Rejected without an interview",
            RejectSubType::AfterRecruiterScreen => "Rejected after the recruiter screen",
            RejectSubType::AfterTechnicalInterview => "Rejected after the technical interview",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Skill,
    Culture,
    Location,
    Language,
    Salary,
    Domain,
    Timing,
    Other,
}

impl RejectReason {
    pub const ALL: [RejectReason; 8] = [
        RejectReason::Skill,
        RejectReason::Culture,
        RejectReason::Location,
        RejectReason::Language,
        RejectReason::Salary,
        RejectReason::Domain,
        RejectReason::Timing,
        RejectReason::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::Skill => "Missing a required skill",
            RejectReason::Culture => "No culture fit",
            RejectReason::Location => "Location / visa",
            RejectReason::Language => "Language",
            RejectReason::Salary => "Salary / budget",
            RejectReason::Domain => "No domain experience",
            RejectReason::Timing => "Timing / availability",
            RejectReason::Other => "Other",
        }
    }
}

/// One persisted row per completed form section. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRecord {
    pub id: Uuid,
    /// Groups the records written by one form run.
    pub form_run_id: Uuid,
    pub user_id: i64,
    pub funnel_shape: FunnelShape,
    pub channel: String,
    pub week_start: NaiveDate,
    pub stage: EventStage,
    pub events_count: u32,
    pub rating_overall: u8,
    pub strengths: Option<String>,
    pub weaknesses: Option<String>,
    pub rating_mood: u8,
    pub reject_sub_type: Option<RejectSubType>,
    pub reject_reasons: Option<BTreeSet<RejectReason>>,
    pub reject_reason_other: Option<String>,
    pub created_at: DateTime<Utc>,
}
