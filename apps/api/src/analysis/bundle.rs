use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::analysis::hypotheses::Hypothesis;
use crate::analysis::problems::ProblemFlag;
use crate::funnel::metrics::{compute_metrics, ConversionMetrics, ConversionStage};
use crate::funnel::store::WeeklyTotals;
use crate::models::feedback::FeedbackRecord;
use crate::models::funnel::FunnelShape;
use crate::models::profile::UserProfile;

/// Below this conversion a problem area is critical rather than low.
pub const CRITICAL_CVR_PCT: u32 = 5;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BundleStatus {
    /// No profile or no counters yet.
    InsufficientData,
    NoProblems,
    ProblemsFound,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Low,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProblemArea {
    pub stage: ConversionStage,
    pub value: u32,
    pub severity: Severity,
}

/// The analysed week: totals across channels, their metrics, and where
/// they are weak.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FunnelSummary {
    pub week_start: NaiveDate,
    pub funnel_shape: FunnelShape,
    pub channels: usize,
    pub metrics: ConversionMetrics,
    pub problem_areas: Vec<ProblemArea>,
}

impl FunnelSummary {
    pub fn new(totals: &WeeklyTotals, flags: &[ProblemFlag]) -> Self {
        Self {
            week_start: totals.week_start,
            funnel_shape: totals.snapshot.shape(),
            channels: totals.channels,
            metrics: compute_metrics(&totals.snapshot),
            problem_areas: flags
                .iter()
                .map(|f| ProblemArea {
                    stage: f.stage,
                    value: f.cvr_value,
                    severity: if f.cvr_value < CRITICAL_CVR_PCT {
                        Severity::Critical
                    } else {
                        Severity::Low
                    },
                })
                .collect(),
        }
    }
}

/// Everything handed to the recommendation generator.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationBundle {
    pub status: BundleStatus,
    pub profile: Option<UserProfile>,
    pub reflection_history: Vec<FeedbackRecord>,
    pub funnel: Option<FunnelSummary>,
    pub problems: Vec<ProblemFlag>,
    pub hypotheses: Vec<Hypothesis>,
}

impl RecommendationBundle {
    /// A bundle for a user with no counter rows to analyse.
    pub fn insufficient(profile: Option<&UserProfile>, recent_feedback: &[FeedbackRecord]) -> Self {
        Self {
            status: BundleStatus::InsufficientData,
            profile: profile.cloned(),
            reflection_history: recent_feedback.to_vec(),
            funnel: None,
            problems: Vec::new(),
            hypotheses: Vec::new(),
        }
    }

    pub fn with_funnel(mut self, funnel: FunnelSummary) -> Self {
        self.funnel = Some(funnel);
        self
    }

    pub fn is_actionable(&self) -> bool {
        self.status == BundleStatus::ProblemsFound
    }
}

/// Hypothesis ids across all flags, first occurrence kept.
pub fn unique_hypothesis_ids(flags: &[ProblemFlag]) -> Vec<&str> {
    let mut seen = HashSet::new();
    flags
        .iter()
        .flat_map(|f| f.hypothesis_ids.iter().map(String::as_str))
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Pure assembly; makes no calls. A missing profile yields
/// `InsufficientData` with whatever else is known.
pub fn build_recommendation_bundle(
    profile: Option<&UserProfile>,
    recent_feedback: &[FeedbackRecord],
    flags: &[ProblemFlag],
    resolved_hypotheses: &[Hypothesis],
) -> RecommendationBundle {
    let status = match (profile, flags.is_empty()) {
        (None, _) => BundleStatus::InsufficientData,
        (Some(_), true) => BundleStatus::NoProblems,
        (Some(_), false) => BundleStatus::ProblemsFound,
    };

    let mut seen = HashSet::new();
    let hypotheses = resolved_hypotheses
        .iter()
        .filter(|h| seen.insert(h.id.as_str()))
        .cloned()
        .collect();

    RecommendationBundle {
        status,
        profile: profile.cloned(),
        reflection_history: recent_feedback.to_vec(),
        funnel: None,
        problems: flags.to_vec(),
        hypotheses,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::analysis::hypotheses::HypothesisCatalog;
    use crate::models::funnel::{ActiveCounters, CounterSnapshot};

    fn profile() -> UserProfile {
        UserProfile {
            user_id: 42,
            role: "Backend engineer".to_string(),
            level: "Senior".to_string(),
            current_location: "Lisbon".to_string(),
            target_location: "Berlin".to_string(),
            deadline_weeks: 12,
            preferred_funnel_shape: FunnelShape::Active,
            salary: None,
            industries: vec!["Fintech".to_string()],
            competencies: vec!["Rust".to_string()],
            updated_at: Utc::now(),
        }
    }

    fn flag(stage: ConversionStage, cvr_value: u32, ids: &[&str]) -> ProblemFlag {
        ProblemFlag {
            stage,
            cvr_value,
            denominator: 10,
            hypothesis_ids: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_hypotheses_are_deduplicated_across_flags() {
        let flags = vec![
            flag(ConversionStage::Cvr1, 10, &["H1"]),
            flag(ConversionStage::Cvr2, 12, &["H1", "H2"]),
        ];
        let ids = unique_hypothesis_ids(&flags);
        assert_eq!(ids, vec!["H1", "H2"]);

        let catalog = HypothesisCatalog::builtin();
        // resolve with the duplicate still present
        let resolved = catalog.resolve(["H1", "H1", "H2"]);
        let bundle = build_recommendation_bundle(Some(&profile()), &[], &flags, &resolved);
        let ids: Vec<_> = bundle.hypotheses.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["H1", "H2"]);
        assert_eq!(bundle.status, BundleStatus::ProblemsFound);
        assert!(bundle.is_actionable());
    }

    #[test]
    fn test_missing_profile_is_insufficient_not_an_error() {
        let flags = vec![flag(ConversionStage::Cvr3, 3, &["H3", "H4"])];
        let bundle = build_recommendation_bundle(None, &[], &flags, &[]);
        assert_eq!(bundle.status, BundleStatus::InsufficientData);
        assert_eq!(bundle.problems.len(), 1);
        assert!(!bundle.is_actionable());
    }

    #[test]
    fn test_no_flags_means_no_problems() {
        let bundle = build_recommendation_bundle(Some(&profile()), &[], &[], &[]);
        assert_eq!(bundle.status, BundleStatus::NoProblems);
        assert!(bundle.hypotheses.is_empty());
    }

    #[test]
    fn test_summary_marks_critical_below_five_percent() {
        let totals = WeeklyTotals {
            week_start: NaiveDate::from_ymd_opt(2025, 2, 3).unwrap(),
            channels: 2,
            snapshot: CounterSnapshot::Active(ActiveCounters {
                applications: 50,
                responses: 2,
                screenings: 1,
                ..Default::default()
            }),
        };
        let flags = vec![
            flag(ConversionStage::Cvr1, 4, &["H1"]),
            flag(ConversionStage::Cvr2, 15, &["H1", "H2"]),
        ];
        let summary = FunnelSummary::new(&totals, &flags);
        assert_eq!(summary.funnel_shape, FunnelShape::Active);
        assert_eq!(summary.channels, 2);
        assert_eq!(summary.problem_areas[0].severity, Severity::Critical);
        assert_eq!(summary.problem_areas[1].severity, Severity::Low);
    }

    #[test]
    fn test_insufficient_bundle_keeps_history() {
        let bundle = RecommendationBundle::insufficient(Some(&profile()), &[]);
        assert_eq!(bundle.status, BundleStatus::InsufficientData);
        assert!(bundle.profile.is_some());
        assert!(bundle.funnel.is_none());
    }
}
