//! Snapshot diffing — what changed between two fetches of one region.

use std::collections::BTreeSet;

use gridwatch_core::error::{GridWatchError, Result};
use gridwatch_core::types::{GroupDiff, IntervalChange, OutageInterval, ScheduleDiff, ScheduleSnapshot};

/// Compare the previous and current snapshot of a region.
///
/// Every interval of both snapshots lands in exactly one bucket:
/// - `added` — present only in current
/// - `removed` — present only in previous
/// - `changed` — same group/day time-overlap exists in both, but the window
///   bounds or the status differ
/// - unchanged (not reported) — identical in both
///
/// With no previous snapshot (first run for the region) the result is every
/// current interval as `added` when `notify_on_first_run` is set, and an
/// empty diff otherwise — the cold-start policy is the caller's config, not
/// ours.
///
/// Fails with `InconsistentSchedule` when `current` contains overlapping
/// intervals within one group — bad upstream data is rejected whole, never
/// partially diffed.
pub fn diff(
    previous: Option<&ScheduleSnapshot>,
    current: &ScheduleSnapshot,
    notify_on_first_run: bool,
) -> Result<ScheduleDiff> {
    validate(current)?;

    let mut groups = Vec::new();

    match previous {
        None => {
            if notify_on_first_run {
                for (group_id, intervals) in &current.groups {
                    if intervals.is_empty() {
                        continue;
                    }
                    groups.push(GroupDiff {
                        group_id: group_id.clone(),
                        added: intervals.clone(),
                        ..GroupDiff::default()
                    });
                }
            } else {
                tracing::debug!(
                    "First snapshot for '{}' recorded silently ({} intervals)",
                    current.region,
                    current.interval_count()
                );
            }
        }
        Some(prev) => {
            let group_ids: BTreeSet<&String> =
                prev.groups.keys().chain(current.groups.keys()).collect();
            for group_id in group_ids {
                let before = prev.groups.get(group_id).map(Vec::as_slice).unwrap_or(&[]);
                let after = current.groups.get(group_id).map(Vec::as_slice).unwrap_or(&[]);
                let group_diff = diff_group(group_id, before, after);
                if !group_diff.is_empty() {
                    groups.push(group_diff);
                }
            }
        }
    }

    Ok(ScheduleDiff {
        region: current.region.clone(),
        version: current.version.clone(),
        groups,
    })
}

/// Diff one group's intervals. Both slices are sorted by (date, start).
fn diff_group(group_id: &str, before: &[OutageInterval], after: &[OutageInterval]) -> GroupDiff {
    let mut matched = vec![false; before.len()];
    let mut result = GroupDiff {
        group_id: group_id.to_string(),
        ..GroupDiff::default()
    };

    for curr in after {
        // At most one previous interval can overlap: snapshots are validated
        // to be overlap-free before they are saved.
        let hit = before
            .iter()
            .enumerate()
            .find(|(i, prev)| !matched[*i] && prev.overlaps(curr));
        match hit {
            Some((i, prev)) => {
                matched[i] = true;
                if prev != curr {
                    result.changed.push(IntervalChange {
                        before: prev.clone(),
                        after: curr.clone(),
                    });
                }
            }
            None => result.added.push(curr.clone()),
        }
    }

    for (i, prev) in before.iter().enumerate() {
        if !matched[i] {
            result.removed.push(prev.clone());
        }
    }

    result
}

/// Reject snapshots with overlapping intervals in one group. Upstream data
/// integrity is a precondition; the analyzer does not repair it.
fn validate(snapshot: &ScheduleSnapshot) -> Result<()> {
    for (group_id, intervals) in &snapshot.groups {
        for pair in intervals.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(GridWatchError::InconsistentSchedule(format!(
                    "region '{}' group {} has overlapping intervals {} and {} on {}",
                    snapshot.region,
                    group_id,
                    pair[0].time_range(),
                    pair[1].time_range(),
                    pair[0].date,
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridwatch_core::types::IntervalStatus;
    use std::collections::BTreeMap;

    fn interval(group: &str, start: u16, end: u16, status: IntervalStatus) -> OutageInterval {
        OutageInterval {
            group_id: group.into(),
            date: "2025-11-09".parse().unwrap(),
            start_minute: start,
            end_minute: end,
            status,
        }
    }

    fn snapshot(region: &str, groups: Vec<(&str, Vec<OutageInterval>)>) -> ScheduleSnapshot {
        let map: BTreeMap<String, Vec<OutageInterval>> = groups
            .into_iter()
            .map(|(g, v)| (g.to_string(), v))
            .collect();
        ScheduleSnapshot::new(region, map)
    }

    #[test]
    fn test_status_change_only() {
        // G1 10:00–12:00 scheduled → 10:00–12:00 cancelled: one change, status only
        let prev = snapshot(
            "kyiv",
            vec![("G1", vec![interval("G1", 600, 720, IntervalStatus::Scheduled)])],
        );
        let curr = snapshot(
            "kyiv",
            vec![("G1", vec![interval("G1", 600, 720, IntervalStatus::Cancelled)])],
        );
        let d = diff(Some(&prev), &curr, false).unwrap();
        assert_eq!(d.groups.len(), 1);
        let g = &d.groups[0];
        assert_eq!(g.group_id, "G1");
        assert!(g.added.is_empty() && g.removed.is_empty());
        assert_eq!(g.changed.len(), 1);
        assert_eq!(g.changed[0].before.status, IntervalStatus::Scheduled);
        assert_eq!(g.changed[0].after.status, IntervalStatus::Cancelled);
        assert_eq!(g.changed[0].before.start_minute, g.changed[0].after.start_minute);
    }

    #[test]
    fn test_time_shift_is_changed() {
        let prev = snapshot(
            "kyiv",
            vec![("1.1", vec![interval("1.1", 600, 720, IntervalStatus::Scheduled)])],
        );
        let curr = snapshot(
            "kyiv",
            vec![("1.1", vec![interval("1.1", 630, 750, IntervalStatus::Scheduled)])],
        );
        let d = diff(Some(&prev), &curr, false).unwrap();
        assert_eq!(d.groups[0].changed.len(), 1);
        assert!(d.groups[0].added.is_empty());
        assert!(d.groups[0].removed.is_empty());
    }

    #[test]
    fn test_added_and_removed() {
        let prev = snapshot(
            "kyiv",
            vec![
                ("1.1", vec![interval("1.1", 0, 90, IntervalStatus::Scheduled)]),
                ("2.1", vec![interval("2.1", 600, 720, IntervalStatus::Scheduled)]),
            ],
        );
        let curr = snapshot(
            "kyiv",
            vec![
                ("1.1", vec![interval("1.1", 0, 90, IntervalStatus::Scheduled)]),
                ("3.1", vec![interval("3.1", 1140, 1350, IntervalStatus::Scheduled)]),
            ],
        );
        let d = diff(Some(&prev), &curr, false).unwrap();
        // 1.1 unchanged → not reported; 2.1 removed; 3.1 added
        assert_eq!(d.groups.len(), 2);
        assert_eq!(d.groups[0].group_id, "2.1");
        assert_eq!(d.groups[0].removed.len(), 1);
        assert_eq!(d.groups[1].group_id, "3.1");
        assert_eq!(d.groups[1].added.len(), 1);
    }

    #[test]
    fn test_partition_is_complete() {
        let prev = snapshot(
            "kyiv",
            vec![(
                "1.1",
                vec![
                    interval("1.1", 0, 90, IntervalStatus::Scheduled),
                    interval("1.1", 510, 720, IntervalStatus::Scheduled),
                    interval("1.1", 1140, 1350, IntervalStatus::Scheduled),
                ],
            )],
        );
        let curr = snapshot(
            "kyiv",
            vec![(
                "1.1",
                vec![
                    interval("1.1", 0, 90, IntervalStatus::Scheduled),     // unchanged
                    interval("1.1", 540, 720, IntervalStatus::Scheduled),  // shifted
                    interval("1.1", 780, 840, IntervalStatus::Scheduled),  // new
                ],
            )],
        );
        let d = diff(Some(&prev), &curr, false).unwrap();
        let g = &d.groups[0];
        // curr: 1 unchanged + 1 changed + 1 added = 3
        assert_eq!(g.changed.len() + g.added.len(), 2);
        // prev: 1 unchanged + 1 changed + 1 removed = 3
        assert_eq!(g.changed.len() + g.removed.len(), 2);
        assert_eq!(g.added.len(), 1);
        assert_eq!(g.removed.len(), 1);
        assert_eq!(g.changed.len(), 1);
    }

    #[test]
    fn test_deterministic_output() {
        let prev = snapshot(
            "kyiv",
            vec![
                ("2.2", vec![interval("2.2", 100, 200, IntervalStatus::Scheduled)]),
                ("1.1", vec![interval("1.1", 0, 90, IntervalStatus::Scheduled)]),
            ],
        );
        let curr = snapshot(
            "kyiv",
            vec![
                ("1.1", vec![interval("1.1", 30, 120, IntervalStatus::Scheduled)]),
                ("2.2", vec![interval("2.2", 300, 400, IntervalStatus::Scheduled)]),
            ],
        );
        let a = diff(Some(&prev), &curr, false).unwrap();
        let b = diff(Some(&prev), &curr, false).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
        // Groups ordered by id
        assert_eq!(a.groups[0].group_id, "1.1");
        assert_eq!(a.groups[1].group_id, "2.2");
    }

    #[test]
    fn test_overlap_in_current_is_rejected() {
        let curr = snapshot(
            "kyiv",
            vec![(
                "1.1",
                vec![
                    interval("1.1", 600, 720, IntervalStatus::Scheduled),
                    interval("1.1", 700, 800, IntervalStatus::Scheduled),
                ],
            )],
        );
        let err = diff(None, &curr, true).unwrap_err();
        assert!(matches!(err, GridWatchError::InconsistentSchedule(_)));
    }

    #[test]
    fn test_first_run_gating() {
        let curr = snapshot(
            "kyiv",
            vec![("1.1", vec![interval("1.1", 600, 720, IntervalStatus::Scheduled)])],
        );
        // Gated off: silent first snapshot
        let silent = diff(None, &curr, false).unwrap();
        assert!(silent.is_empty());
        assert_eq!(silent.version, curr.version);
        // Gated on: everything reported as added
        let loud = diff(None, &curr, true).unwrap();
        assert_eq!(loud.groups.len(), 1);
        assert_eq!(loud.groups[0].added.len(), 1);
    }

    #[test]
    fn test_identical_snapshots_empty_diff() {
        let prev = snapshot(
            "kyiv",
            vec![("1.1", vec![interval("1.1", 600, 720, IntervalStatus::Scheduled)])],
        );
        let curr = snapshot(
            "kyiv",
            vec![("1.1", vec![interval("1.1", 600, 720, IntervalStatus::Scheduled)])],
        );
        assert!(diff(Some(&prev), &curr, false).unwrap().is_empty());
    }
}
