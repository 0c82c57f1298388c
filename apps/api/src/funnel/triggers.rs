//! Delta Trigger Detector — decides which stages changed enough to offer a
//! reflection form.

use serde::{Deserialize, Serialize};

use crate::models::funnel::{CounterSnapshot, EventStage};

/// One event counter that increased between two snapshots of the same key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangedSection {
    pub stage: EventStage,
    /// Always ≥ 1.
    pub delta: u32,
    pub display_label: String,
    pub is_rejection_kind: bool,
}

impl ChangedSection {
    pub fn new(stage: EventStage, delta: u32) -> Self {
        Self {
            stage,
            delta,
            display_label: stage.display_label().to_string(),
            is_rejection_kind: stage.is_rejection_kind(),
        }
    }
}

/// Compares the event counters of `old` and `new` and returns one section per
/// strictly increased counter, in pipeline order.
///
/// A missing `old` is treated as all-zero (first write for the key). Intake
/// counters are never compared. Decreases are corrections and are skipped.
/// Snapshots of different shapes share no counters, so `new` is diffed
/// against zero in that case.
pub fn detect_changes(old: Option<&CounterSnapshot>, new: &CounterSnapshot) -> Vec<ChangedSection> {
    let baseline = match old {
        Some(old) if old.shape() == new.shape() => *old,
        _ => CounterSnapshot::empty(new.shape()),
    };

    baseline
        .event_counts()
        .iter()
        .zip(new.event_counts().iter())
        .filter_map(|((stage, old_value), (_, new_value))| {
            let delta = new_value.checked_sub(*old_value)?;
            (delta > 0).then(|| ChangedSection::new(*stage, delta))
        })
        .collect()
}
