//! Schedule data model — snapshots, outage intervals, subscribers, diffs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Status of a single outage interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalStatus {
    Scheduled,
    Cancelled,
    Ongoing,
}

impl IntervalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalStatus::Scheduled => "scheduled",
            IntervalStatus::Cancelled => "cancelled",
            IntervalStatus::Ongoing => "ongoing",
        }
    }
}

/// One planned outage window for one group on one calendar day.
/// Times are minutes since midnight, the upstream's native unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutageInterval {
    pub group_id: String,
    pub date: NaiveDate,
    pub start_minute: u16,
    pub end_minute: u16,
    pub status: IntervalStatus,
}

impl OutageInterval {
    /// Whether two intervals overlap in time on the same day.
    pub fn overlaps(&self, other: &OutageInterval) -> bool {
        self.date == other.date
            && self.start_minute < other.end_minute
            && other.start_minute < self.end_minute
    }

    /// "10:00–12:30" style display of the window.
    pub fn time_range(&self) -> String {
        format!(
            "{}–{}",
            minutes_to_hhmm(self.start_minute),
            minutes_to_hhmm(self.end_minute)
        )
    }
}

/// Format minutes since midnight as HH:MM.
pub fn minutes_to_hhmm(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// A point-in-time record of one region's published schedule.
/// Immutable once stored; superseded, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub region: String,
    pub fetched_at: DateTime<Utc>,
    /// sha256 fingerprint of the canonical interval list. Two fetches of
    /// the same published schedule produce the same version.
    pub version: String,
    /// Intervals keyed by group id. Sorted by (date, start) within a group.
    pub groups: BTreeMap<String, Vec<OutageInterval>>,
}

impl ScheduleSnapshot {
    /// Build a snapshot: sorts intervals and computes the version.
    pub fn new(region: &str, mut groups: BTreeMap<String, Vec<OutageInterval>>) -> Self {
        for intervals in groups.values_mut() {
            intervals.sort_by_key(|i| (i.date, i.start_minute));
        }
        let version = Self::fingerprint(&groups);
        Self {
            region: region.to_string(),
            fetched_at: Utc::now(),
            version,
            groups,
        }
    }

    /// Canonical content hash over (group, date, window, status) tuples.
    pub fn fingerprint(groups: &BTreeMap<String, Vec<OutageInterval>>) -> String {
        let mut hasher = Sha256::new();
        for (group_id, intervals) in groups {
            for i in intervals {
                hasher.update(group_id.as_bytes());
                hasher.update(b"|");
                hasher.update(i.date.to_string().as_bytes());
                hasher.update(i.start_minute.to_le_bytes());
                hasher.update(i.end_minute.to_le_bytes());
                hasher.update(i.status.as_str().as_bytes());
                hasher.update(b";");
            }
        }
        format!("{:x}", hasher.finalize())
    }

    /// Total interval count across all groups.
    pub fn interval_count(&self) -> usize {
        self.groups.values().map(|v| v.len()).sum()
    }
}

/// A chat member who opted in for notifications about one group.
/// Identity is (chat_id, user_id) — one registration per user per chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub chat_id: i64,
    pub user_id: i64,
    pub username: String,
    pub group_id: String,
    pub registered_at: DateTime<Utc>,
}

/// An interval whose window or status changed between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalChange {
    pub before: OutageInterval,
    pub after: OutageInterval,
}

/// Per-group diff between two snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupDiff {
    pub group_id: String,
    pub added: Vec<OutageInterval>,
    pub removed: Vec<OutageInterval>,
    pub changed: Vec<IntervalChange>,
}

impl GroupDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Structured diff between the previous and current snapshot of a region.
/// Transient: produced once per poll cycle, consumed by the dispatcher,
/// then discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDiff {
    pub region: String,
    /// Version of the *current* snapshot — the delivery dedup key.
    pub version: String,
    /// Only groups with a non-empty diff, sorted by group id.
    pub groups: Vec<GroupDiff>,
}

impl ScheduleDiff {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Outcome counts of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: u32,
    pub failed: u32,
    pub skipped: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(group: &str, date: &str, start: u16, end: u16) -> OutageInterval {
        OutageInterval {
            group_id: group.into(),
            date: date.parse().unwrap(),
            start_minute: start,
            end_minute: end,
            status: IntervalStatus::Scheduled,
        }
    }

    #[test]
    fn test_overlaps() {
        let a = interval("1.1", "2025-11-09", 600, 720);
        let b = interval("1.1", "2025-11-09", 700, 800);
        let c = interval("1.1", "2025-11-09", 720, 800);
        let d = interval("1.1", "2025-11-10", 600, 720);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // touching is not overlapping
        assert!(!a.overlaps(&d)); // different day
    }

    #[test]
    fn test_minutes_to_hhmm() {
        assert_eq!(minutes_to_hhmm(0), "00:00");
        assert_eq!(minutes_to_hhmm(90), "01:30");
        assert_eq!(minutes_to_hhmm(750), "12:30");
    }

    #[test]
    fn test_fingerprint_stable() {
        let mut groups = BTreeMap::new();
        groups.insert("1.1".to_string(), vec![interval("1.1", "2025-11-09", 0, 90)]);
        let a = ScheduleSnapshot::new("kyiv", groups.clone());
        let b = ScheduleSnapshot::new("kyiv", groups);
        assert_eq!(a.version, b.version);
    }

    #[test]
    fn test_fingerprint_sensitive_to_status() {
        let mk = |status| {
            let mut i = interval("1.1", "2025-11-09", 600, 720);
            i.status = status;
            let mut groups = BTreeMap::new();
            groups.insert("1.1".to_string(), vec![i]);
            ScheduleSnapshot::new("kyiv", groups)
        };
        assert_ne!(
            mk(IntervalStatus::Scheduled).version,
            mk(IntervalStatus::Cancelled).version
        );
    }

    #[test]
    fn test_snapshot_sorts_intervals() {
        let mut groups = BTreeMap::new();
        groups.insert(
            "1.1".to_string(),
            vec![
                interval("1.1", "2025-11-09", 600, 720),
                interval("1.1", "2025-11-09", 0, 90),
            ],
        );
        let snap = ScheduleSnapshot::new("kyiv", groups);
        let intervals = &snap.groups["1.1"];
        assert_eq!(intervals[0].start_minute, 0);
        assert_eq!(intervals[1].start_minute, 600);
    }
}
