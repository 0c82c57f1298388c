//! Problem Detector — flags conversion stages that are low on a sample large
//! enough to mean something.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::funnel::metrics::{compute_metrics, ConversionStage, StageRate};
use crate::models::funnel::CounterSnapshot;

pub const DEFAULT_THRESHOLD_PCT: u32 = 20;
pub const DEFAULT_MIN_DENOMINATOR: u32 = 5;

/// Which hypotheses explain a low conversion at each stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageHypothesisMap(BTreeMap<ConversionStage, Vec<String>>);

impl StageHypothesisMap {
    #[cfg(test)]
    pub fn new(map: BTreeMap<ConversionStage, Vec<String>>) -> Self {
        Self(map)
    }

    pub fn ids(&self, stage: ConversionStage) -> &[String] {
        self.0.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Default for StageHypothesisMap {
    fn default() -> Self {
        let ids = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self(BTreeMap::from([
            (ConversionStage::Cvr1, ids(&["H1"])),
            (ConversionStage::Cvr2, ids(&["H1", "H2"])),
            (ConversionStage::Cvr3, ids(&["H3", "H4"])),
            (ConversionStage::Cvr4, ids(&["H5"])),
        ]))
    }
}

/// Detector parameters, injected at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorConfig {
    pub threshold_pct: u32,
    pub min_denominator: u32,
    pub hypothesis_map: StageHypothesisMap,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold_pct: DEFAULT_THRESHOLD_PCT,
            min_denominator: DEFAULT_MIN_DENOMINATOR,
            hypothesis_map: StageHypothesisMap::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProblemFlag {
    pub stage: ConversionStage,
    pub cvr_value: u32,
    pub denominator: u32,
    pub hypothesis_ids: Vec<String>,
}

/// A stage is a problem iff it has data, its denominator is at least
/// `min_denominator`, and its rate is below `threshold_pct`.
pub fn is_problem(rate: StageRate, denominator: u32, config: &DetectorConfig) -> bool {
    match rate {
        StageRate::Percent(pct) => {
            denominator >= config.min_denominator && pct < config.threshold_pct
        }
        StageRate::NoData => false,
    }
}

pub fn detect_problems(snapshot: &CounterSnapshot, config: &DetectorConfig) -> Vec<ProblemFlag> {
    let metrics = compute_metrics(snapshot);

    metrics
        .stages
        .iter()
        .filter_map(|metric| {
            let cvr_value = metric.rate.percent()?;
            let flagged = is_problem(metric.rate, metric.denominator, config);
            debug!(
                "{}: {}% of {} (flagged: {flagged})",
                metric.stage.as_str(),
                cvr_value,
                metric.denominator
            );
            flagged.then(|| ProblemFlag {
                stage: metric.stage,
                cvr_value,
                denominator: metric.denominator,
                hypothesis_ids: config.hypothesis_map.ids(metric.stage).to_vec(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::funnel::{ActiveCounters, PassiveCounters};

    fn active(applications: u32, responses: u32) -> CounterSnapshot {
        CounterSnapshot::Active(ActiveCounters {
            applications,
            responses,
            ..Default::default()
        })
    }

    #[test]
    fn test_low_rate_with_enough_sample_is_flagged() {
        // 15% of 20
        let flags = detect_problems(&active(20, 3), &DetectorConfig::default());
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].stage, ConversionStage::Cvr1);
        assert_eq!(flags[0].cvr_value, 15);
        assert_eq!(flags[0].denominator, 20);
        assert_eq!(flags[0].hypothesis_ids, vec!["H1".to_string()]);
    }

    #[test]
    fn test_scenario_threshold_and_min_denominator() {
        let config = DetectorConfig::default();
        assert!(is_problem(StageRate::Percent(15), 10, &config));
        assert!(!is_problem(StageRate::Percent(15), 3, &config));
        assert!(!is_problem(StageRate::NoData, 10, &config));
    }

    #[test]
    fn test_small_sample_snapshot_is_not_flagged() {
        // 0 of 3 is 0%, but 3 applications say nothing yet
        assert!(detect_problems(&active(3, 0), &DetectorConfig::default()).is_empty());

        let strict = DetectorConfig {
            min_denominator: 25,
            ..DetectorConfig::default()
        };
        assert!(detect_problems(&active(20, 3), &strict).is_empty());
    }

    #[test]
    fn test_no_data_is_never_flagged() {
        let flags = detect_problems(
            &CounterSnapshot::Active(ActiveCounters::default()),
            &DetectorConfig {
                min_denominator: 0,
                ..DetectorConfig::default()
            },
        );
        assert!(flags.is_empty());
    }

    #[test]
    fn test_rate_equal_to_threshold_is_not_flagged() {
        // 2/10 = 20%
        assert!(detect_problems(&active(10, 2), &DetectorConfig::default()).is_empty());
    }

    #[test]
    fn test_threshold_is_configurable() {
        let config = DetectorConfig {
            threshold_pct: 10,
            ..DetectorConfig::default()
        };
        // 15% is fine at a 10% threshold
        assert!(detect_problems(&active(20, 3), &config).is_empty());
    }

    #[test]
    fn test_passive_later_stages_map_to_hypotheses() {
        let snapshot = CounterSnapshot::Passive(PassiveCounters {
            views: 40,
            inbound: 20,
            screenings: 10,
            onsites: 1,
            offers: 0,
            rejections: 3,
        });
        let flags = detect_problems(&snapshot, &DetectorConfig::default());
        // CVR3 = 10% of 10; CVR4 has denominator 1
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].stage, ConversionStage::Cvr3);
        assert_eq!(
            flags[0].hypothesis_ids,
            vec!["H3".to_string(), "H4".to_string()]
        );
    }

    #[test]
    fn test_custom_hypothesis_map() {
        let config = DetectorConfig {
            hypothesis_map: StageHypothesisMap::new(BTreeMap::from([(
                ConversionStage::Cvr1,
                vec!["X9".to_string()],
            )])),
            ..DetectorConfig::default()
        };
        let flags = detect_problems(&active(20, 3), &config);
        assert_eq!(flags[0].hypothesis_ids, vec!["X9".to_string()]);
    }
}
