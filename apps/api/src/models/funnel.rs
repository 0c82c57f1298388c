use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Largest value a stored counter may hold (the INTEGER column limit).
pub const MAX_COUNTER: u32 = i32::MAX as u32;

/// One of the two fixed counter taxonomies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum FunnelShape {
    /// The candidate applies: applications → responses → screenings → onsites → offers.
    #[default]
    Active,
    /// The candidate is found: profile views → inbound → screenings → onsites → offers.
    Passive,
}

impl FunnelShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunnelShape::Active => "active",
            FunnelShape::Passive => "passive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(FunnelShape::Active),
            "passive" => Some(FunnelShape::Passive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ActiveCounters {
    #[serde(alias = "intake")]
    pub applications: u32,
    pub responses: u32,
    pub screenings: u32,
    pub onsites: u32,
    pub offers: u32,
    pub rejections: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct PassiveCounters {
    pub views: u32,
    #[serde(alias = "incoming")]
    pub inbound: u32,
    pub screenings: u32,
    pub onsites: u32,
    pub offers: u32,
    pub rejections: u32,
}

/// A weekly counter row (or a delta to add to one). The variant fixes the
/// field set, so shape-specific access is checked at compile time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "funnel_shape", rename_all = "snake_case")]
pub enum CounterSnapshot {
    Active(ActiveCounters),
    Passive(PassiveCounters),
}

/// Counters that represent an outcome worth reflecting on. Intake counters
/// (applications, views) are deliberately absent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EventStage {
    Response,
    Inbound,
    Screening,
    Onsite,
    Offer,
    Rejection,
}

impl EventStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStage::Response => "response",
            EventStage::Inbound => "inbound",
            EventStage::Screening => "screening",
            EventStage::Onsite => "onsite",
            EventStage::Offer => "offer",
            EventStage::Rejection => "rejection",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "response" => Some(EventStage::Response),
            "inbound" => Some(EventStage::Inbound),
            "screening" => Some(EventStage::Screening),
            "onsite" => Some(EventStage::Onsite),
            "offer" => Some(EventStage::Offer),
            "rejection" => Some(EventStage::Rejection),
            _ => None,
        }
    }

    pub fn display_label(&self) -> &'static str {
        match self {
            EventStage::Response => "✉️ Response",
            EventStage::Inbound => "📥 Inbound request",
            EventStage::Screening => "📞 Screening",
            EventStage::Onsite => "🧑‍💼 Onsite",
            EventStage::Offer => "🏁 Offer",
            EventStage::Rejection => "❌ Rejection",
        }
    }

    pub fn is_rejection_kind(&self) -> bool {
        matches!(self, EventStage::Rejection)
    }
}

impl CounterSnapshot {
    /// An all-zero snapshot of the given shape.
    pub fn empty(shape: FunnelShape) -> Self {
        match shape {
            FunnelShape::Active => CounterSnapshot::Active(ActiveCounters::default()),
            FunnelShape::Passive => CounterSnapshot::Passive(PassiveCounters::default()),
        }
    }

    pub fn shape(&self) -> FunnelShape {
        match self {
            CounterSnapshot::Active(_) => FunnelShape::Active,
            CounterSnapshot::Passive(_) => FunnelShape::Passive,
        }
    }

    /// The five pipeline counts in fixed order: intake, first reply,
    /// screenings, onsites, offers.
    pub fn pipeline(&self) -> [u32; 5] {
        match self {
            CounterSnapshot::Active(c) => {
                [c.applications, c.responses, c.screenings, c.onsites, c.offers]
            }
            CounterSnapshot::Passive(c) => [c.views, c.inbound, c.screenings, c.onsites, c.offers],
        }
    }

    /// The highest of all six counters.
    pub fn largest(&self) -> u32 {
        let [_, _, _, _, rejections] = self.event_counts().map(|(_, n)| n);
        self.pipeline().into_iter().fold(rejections, u32::max)
    }

    /// Event counters in pipeline order, rejections last.
    pub fn event_counts(&self) -> [(EventStage, u32); 5] {
        match self {
            CounterSnapshot::Active(c) => [
                (EventStage::Response, c.responses),
                (EventStage::Screening, c.screenings),
                (EventStage::Onsite, c.onsites),
                (EventStage::Offer, c.offers),
                (EventStage::Rejection, c.rejections),
            ],
            CounterSnapshot::Passive(c) => [
                (EventStage::Inbound, c.inbound),
                (EventStage::Screening, c.screenings),
                (EventStage::Onsite, c.onsites),
                (EventStage::Offer, c.offers),
                (EventStage::Rejection, c.rejections),
            ],
        }
    }

    /// Field-wise sum. Returns `None` when the shapes differ or a counter
    /// would overflow.
    pub fn checked_add(&self, other: &CounterSnapshot) -> Option<CounterSnapshot> {
        match (self, other) {
            (CounterSnapshot::Active(a), CounterSnapshot::Active(b)) => {
                Some(CounterSnapshot::Active(ActiveCounters {
                    applications: a.applications.checked_add(b.applications)?,
                    responses: a.responses.checked_add(b.responses)?,
                    screenings: a.screenings.checked_add(b.screenings)?,
                    onsites: a.onsites.checked_add(b.onsites)?,
                    offers: a.offers.checked_add(b.offers)?,
                    rejections: a.rejections.checked_add(b.rejections)?,
                }))
            }
            (CounterSnapshot::Passive(a), CounterSnapshot::Passive(b)) => {
                Some(CounterSnapshot::Passive(PassiveCounters {
                    views: a.views.checked_add(b.views)?,
                    inbound: a.inbound.checked_add(b.inbound)?,
                    screenings: a.screenings.checked_add(b.screenings)?,
                    onsites: a.onsites.checked_add(b.onsites)?,
                    offers: a.offers.checked_add(b.offers)?,
                    rejections: a.rejections.checked_add(b.rejections)?,
                }))
            }
            _ => None,
        }
    }

    /// Field-wise saturating difference. Returns `None` when the shapes differ.
    pub fn checked_sub(&self, other: &CounterSnapshot) -> Option<CounterSnapshot> {
        match (self, other) {
            (CounterSnapshot::Active(a), CounterSnapshot::Active(b)) => {
                Some(CounterSnapshot::Active(ActiveCounters {
                    applications: a.applications.saturating_sub(b.applications),
                    responses: a.responses.saturating_sub(b.responses),
                    screenings: a.screenings.saturating_sub(b.screenings),
                    onsites: a.onsites.saturating_sub(b.onsites),
                    offers: a.offers.saturating_sub(b.offers),
                    rejections: a.rejections.saturating_sub(b.rejections),
                }))
            }
            (CounterSnapshot::Passive(a), CounterSnapshot::Passive(b)) => {
                Some(CounterSnapshot::Passive(PassiveCounters {
                    views: a.views.saturating_sub(b.views),
                    inbound: a.inbound.saturating_sub(b.inbound),
                    screenings: a.screenings.saturating_sub(b.screenings),
                    onsites: a.onsites.saturating_sub(b.onsites),
                    offers: a.offers.saturating_sub(b.offers),
                    rejections: a.rejections.saturating_sub(b.rejections),
                }))
            }
            _ => None,
        }
    }
}

/// Identity of one weekly counter row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub user_id: i64,
    pub week_start: NaiveDate,
    pub channel: String,
    pub funnel_shape: FunnelShape,
}

/// A stored counter row together with its key.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotRow {
    pub user_id: i64,
    pub week_start: NaiveDate,
    pub channel: String,
    pub snapshot: CounterSnapshot,
}

/// Monday of the week containing `date`.
pub fn week_start_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_week_start_is_monday() {
        let thursday = NaiveDate::from_ymd_opt(2025, 1, 23).unwrap();
        assert_eq!(
            week_start_of(thursday),
            NaiveDate::from_ymd_opt(2025, 1, 20).unwrap()
        );
        let monday = NaiveDate::from_ymd_opt(2025, 1, 20).unwrap();
        assert_eq!(week_start_of(monday), monday);
    }

    #[test]
    fn test_snapshot_deserializes_with_missing_counters_as_zero() {
        let json = r#"{"funnel_shape":"active","applications":10,"responses":2}"#;
        let snapshot: CounterSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.pipeline(), [10, 2, 0, 0, 0]);
    }

    #[test]
    fn test_passive_accepts_incoming_alias() {
        let json = r#"{"funnel_shape":"passive","views":40,"incoming":4}"#;
        let snapshot: CounterSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.shape(), FunnelShape::Passive);
        assert_eq!(snapshot.pipeline()[1], 4);
    }

    #[test]
    fn test_add_rejects_mixed_shapes() {
        let active = CounterSnapshot::empty(FunnelShape::Active);
        let passive = CounterSnapshot::empty(FunnelShape::Passive);
        assert!(active.checked_add(&passive).is_none());
        assert!(active.checked_sub(&passive).is_none());
    }

    #[test]
    fn test_add_overflow_is_none() {
        let near_max = CounterSnapshot::Active(ActiveCounters {
            responses: 3_000_000_000,
            ..Default::default()
        });
        assert!(near_max.checked_add(&near_max).is_none());
    }

    #[test]
    fn test_largest_covers_rejections() {
        let snapshot = CounterSnapshot::Passive(PassiveCounters {
            views: 12,
            rejections: 40,
            ..Default::default()
        });
        assert_eq!(snapshot.largest(), 40);
    }

    #[test]
    fn test_sub_saturates() {
        let small = CounterSnapshot::Active(ActiveCounters {
            responses: 1,
            ..Default::default()
        });
        let big = CounterSnapshot::Active(ActiveCounters {
            responses: 3,
            ..Default::default()
        });
        let diff = small.checked_sub(&big).unwrap();
        assert_eq!(diff.pipeline()[1], 0);
    }
}
