//! Metrics Engine — stage conversion percentages for one counter snapshot.
//!
//! Pure and total: a zero denominator yields `StageRate::NoData`, never 0%.

use serde::{Deserialize, Serialize};

use crate::models::funnel::CounterSnapshot;

/// One of the four adjacent pipeline transitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConversionStage {
    #[serde(rename = "CVR1")]
    Cvr1,
    #[serde(rename = "CVR2")]
    Cvr2,
    #[serde(rename = "CVR3")]
    Cvr3,
    #[serde(rename = "CVR4")]
    Cvr4,
}

impl ConversionStage {
    pub const ALL: [ConversionStage; 4] = [
        ConversionStage::Cvr1,
        ConversionStage::Cvr2,
        ConversionStage::Cvr3,
        ConversionStage::Cvr4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionStage::Cvr1 => "CVR1",
            ConversionStage::Cvr2 => "CVR2",
            ConversionStage::Cvr3 => "CVR3",
            ConversionStage::Cvr4 => "CVR4",
        }
    }

    /// Position of the denominator counter in `CounterSnapshot::pipeline()`.
    /// The numerator is the next position.
    pub fn pipeline_index(&self) -> usize {
        match self {
            ConversionStage::Cvr1 => 0,
            ConversionStage::Cvr2 => 1,
            ConversionStage::Cvr3 => 2,
            ConversionStage::Cvr4 => 3,
        }
    }
}

/// Integer percentage, or the explicit "no data" sentinel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StageRate {
    NoData,
    Percent(u32),
}

impl StageRate {
    pub fn percent(&self) -> Option<u32> {
        match self {
            StageRate::Percent(p) => Some(*p),
            StageRate::NoData => None,
        }
    }
}

impl std::fmt::Display for StageRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageRate::Percent(p) => write!(f, "{p}%"),
            StageRate::NoData => write!(f, "—"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageMetric {
    pub stage: ConversionStage,
    pub rate: StageRate,
    pub numerator: u32,
    pub denominator: u32,
}

/// Four ordered conversion metrics, CVR1 first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversionMetrics {
    pub stages: [StageMetric; 4],
}

#[cfg(test)]
impl ConversionMetrics {
    pub fn rate(&self, stage: ConversionStage) -> StageRate {
        self.stages[stage.pipeline_index()].rate
    }

    pub fn get(&self, stage: ConversionStage) -> &StageMetric {
        &self.stages[stage.pipeline_index()]
    }
}

/// `round(100 * numerator / denominator)`, half away from zero.
pub fn conversion_rate(numerator: u32, denominator: u32) -> StageRate {
    if denominator == 0 {
        return StageRate::NoData;
    }
    let numerator = numerator as u64;
    let denominator = denominator as u64;
    let percent = (200 * numerator + denominator) / (2 * denominator);
    StageRate::Percent(u32::try_from(percent).unwrap_or(u32::MAX))
}

/// Computes the four stage conversions for a snapshot in its own shape's
/// pipeline order.
pub fn compute_metrics(snapshot: &CounterSnapshot) -> ConversionMetrics {
    let pipeline = snapshot.pipeline();
    let stages = ConversionStage::ALL.map(|stage| {
        let i = stage.pipeline_index();
        let denominator = pipeline[i];
        let numerator = pipeline[i + 1];
        StageMetric {
            stage,
            rate: conversion_rate(numerator, denominator),
            numerator,
            denominator,
        }
    });
    ConversionMetrics { stages }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::funnel::{ActiveCounters, FunnelShape, PassiveCounters};

    #[test]
    fn test_active_scenario_rates() {
        let snapshot = CounterSnapshot::Active(ActiveCounters {
            applications: 10,
            responses: 3,
            screenings: 2,
            onsites: 1,
            offers: 1,
            rejections: 0,
        });
        let metrics = compute_metrics(&snapshot);
        assert_eq!(metrics.rate(ConversionStage::Cvr1), StageRate::Percent(30));
        assert_eq!(metrics.rate(ConversionStage::Cvr2), StageRate::Percent(67));
        assert_eq!(metrics.rate(ConversionStage::Cvr3), StageRate::Percent(50));
        assert_eq!(metrics.rate(ConversionStage::Cvr4), StageRate::Percent(100));
    }

    #[test]
    fn test_zero_denominator_is_no_data_not_zero() {
        let metrics = compute_metrics(&CounterSnapshot::empty(FunnelShape::Active));
        for stage in ConversionStage::ALL {
            assert_eq!(metrics.rate(stage), StageRate::NoData);
        }
    }

    #[test]
    fn test_zero_numerator_with_denominator_is_zero_percent() {
        let snapshot = CounterSnapshot::Active(ActiveCounters {
            applications: 8,
            ..Default::default()
        });
        let metrics = compute_metrics(&snapshot);
        assert_eq!(metrics.rate(ConversionStage::Cvr1), StageRate::Percent(0));
        assert_eq!(metrics.rate(ConversionStage::Cvr2), StageRate::NoData);
    }

    #[test]
    fn test_passive_uses_views_and_inbound() {
        let snapshot = CounterSnapshot::Passive(PassiveCounters {
            views: 200,
            inbound: 9,
            screenings: 3,
            onsites: 0,
            offers: 0,
            rejections: 2,
        });
        let metrics = compute_metrics(&snapshot);
        // 9/200 = 4.5% rounds half away from zero
        assert_eq!(metrics.rate(ConversionStage::Cvr1), StageRate::Percent(5));
        assert_eq!(metrics.rate(ConversionStage::Cvr2), StageRate::Percent(33));
        assert_eq!(metrics.rate(ConversionStage::Cvr3), StageRate::Percent(0));
        assert_eq!(metrics.rate(ConversionStage::Cvr4), StageRate::NoData);
        assert_eq!(metrics.get(ConversionStage::Cvr1).denominator, 200);
    }

    #[test]
    fn test_rate_can_exceed_hundred() {
        assert_eq!(conversion_rate(3, 2), StageRate::Percent(150));
    }

    #[test]
    fn test_compute_is_deterministic() {
        let snapshot = CounterSnapshot::Active(ActiveCounters {
            applications: 7,
            responses: 5,
            ..Default::default()
        });
        assert_eq!(compute_metrics(&snapshot), compute_metrics(&snapshot));
    }

    #[test]
    fn test_display_sentinel() {
        assert_eq!(StageRate::NoData.to_string(), "—");
        assert_eq!(StageRate::Percent(42).to_string(), "42%");
    }
}
