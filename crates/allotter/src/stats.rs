//! Point-in-time pool statistics.
//!
//! Statistics are computed from a plain read of each pool; they never take the
//! mutation gate and may observe a pool that is being rewritten concurrently.

use crate::{pool::PoolSpec, record::Record};
use chrono::{DateTime, TimeDelta, Utc};

/// Rolling windows measured back from the current instant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Window {
    Day,
    Week,
    Month,
}

impl Window {
    pub const ALL: [Self; 3] = [Self::Day, Self::Week, Self::Month];

    pub fn span(self) -> TimeDelta {
        match self {
            Self::Day => TimeDelta::days(1),
            Self::Week => TimeDelta::days(7),
            Self::Month => TimeDelta::days(30),
        }
    }

    /// Inclusive lower bound of the window ending at `now`.
    pub fn start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.span()
    }
}

/// Counts of claims that fall into each [`Window`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WindowCounts {
    pub day: usize,
    pub week: usize,
    pub month: usize,
}

impl WindowCounts {
    pub fn get(&self, window: Window) -> usize {
        match window {
            Window::Day => self.day,
            Window::Week => self.week,
            Window::Month => self.month,
        }
    }

    fn add(&mut self, other: &Self) {
        self.day += other.day;
        self.week += other.week;
        self.month += other.month;
    }
}

/// Statistics of one pool.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolStats {
    pub key: String,
    pub name: String,
    pub free: usize,
    pub total: usize,
    pub claimed: WindowCounts,
}

impl PoolStats {
    /// Computes the statistics of `records` as of `now`.
    pub fn compute(spec: &PoolSpec, records: &[Record], now: DateTime<Utc>) -> Self {
        let starts = Window::ALL.map(|w| w.start(now));
        let mut claimed = WindowCounts::default();
        for at in records
            .iter()
            .filter_map(|r| r.claim().and_then(|c| c.claimed_at()))
        {
            claimed.day += usize::from(at >= starts[0]);
            claimed.week += usize::from(at >= starts[1]);
            claimed.month += usize::from(at >= starts[2]);
        }

        Self {
            key: spec.key.to_string(),
            name: spec.name.clone(),
            free: records.iter().filter(|r| r.is_free()).count(),
            total: records.len(),
            claimed,
        }
    }
}

/// Statistics across every pool of the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatsReport {
    pub taken_at: DateTime<Utc>,
    pub pools: Vec<PoolStats>,
}

impl StatsReport {
    pub fn total_free(&self) -> usize {
        self.pools.iter().map(|p| p.free).sum()
    }

    pub fn total_records(&self) -> usize {
        self.pools.iter().map(|p| p.total).sum()
    }

    pub fn total_claimed(&self) -> WindowCounts {
        let mut totals = WindowCounts::default();
        for pool in &self.pools {
            totals.add(&pool.claimed);
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 31, 12, 0, 0).unwrap()
    }

    fn claimed_at(value: &str, at: DateTime<Utc>) -> Record {
        let mut r = Record::unclaimed(value);
        r.claim_for(Identity(1), "", at);
        r
    }

    #[test]
    fn windows_have_inclusive_lower_bounds() {
        let records = vec![
            claimed_at("a", now() - TimeDelta::hours(1)),
            claimed_at("b", now() - TimeDelta::days(1)),
            claimed_at("c", now() - TimeDelta::days(1) - TimeDelta::seconds(1)),
            claimed_at("d", now() - TimeDelta::days(7)),
            claimed_at("e", now() - TimeDelta::days(29)),
            claimed_at("f", now() - TimeDelta::days(31)),
            Record::unclaimed("g"),
            Record::unclaimed(""),
        ];
        let spec = PoolSpec::new("vk", "VK", 250);
        let stats = PoolStats::compute(&spec, &records, now());
        assert_eq!(stats.total, 8);
        assert_eq!(stats.free, 1);
        assert_eq!(
            stats.claimed,
            WindowCounts {
                day: 2,
                week: 4,
                month: 5
            }
        );
    }

    #[test]
    fn unparseable_claim_times_are_not_counted() {
        let records = vec![Record::from_columns(
            "x".into(),
            "5".into(),
            String::new(),
            "sometime".into(),
        )];
        let stats = PoolStats::compute(&PoolSpec::new("ok", "OK", 1), &records, now());
        assert_eq!(stats.free, 0);
        assert_eq!(stats.claimed, WindowCounts::default());
    }

    #[test]
    fn totals_sum_across_pools() {
        let report = StatsReport {
            taken_at: now(),
            pools: vec![
                PoolStats {
                    key: "a".into(),
                    name: "A".into(),
                    free: 3,
                    total: 10,
                    claimed: WindowCounts {
                        day: 1,
                        week: 2,
                        month: 7,
                    },
                },
                PoolStats {
                    key: "b".into(),
                    name: "B".into(),
                    free: 0,
                    total: 4,
                    claimed: WindowCounts {
                        day: 0,
                        week: 4,
                        month: 4,
                    },
                },
            ],
        };
        assert_eq!(report.total_free(), 3);
        assert_eq!(report.total_records(), 14);
        assert_eq!(report.total_claimed().get(Window::Week), 6);
        assert_eq!(report.total_claimed().month, 11);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn report_json_round_trips() {
        let spec = PoolSpec::new("vk", "ВКонтакте", 250);
        let report = StatsReport {
            taken_at: now(),
            pools: vec![PoolStats::compute(
                &spec,
                &[claimed_at("a", now()), Record::unclaimed("b")],
                now(),
            )],
        };
        let text = serde_json::to_string(&report).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["taken_at"], "2025-05-31T12:00:00Z");
        assert_eq!(json["pools"][0]["name"], "ВКонтакте");
        assert_eq!(json["pools"][0]["claimed"]["day"], 1);

        let back: StatsReport = serde_json::from_str(&text).unwrap();
        assert_eq!(back, report);
    }
}
