//! Power-on window analysis — the engine behind the /calculate command.
//!
//! The upstream publishes OUTAGES; chats want to know when everyone HAS
//! power. Windows are (start, end) minute pairs over one 0..1440 day.

use gridwatch_core::types::minutes_to_hhmm;

const DAY_MINUTES: u16 = 24 * 60;

/// A half-open minute window within one day.
pub type MinuteWindow = (u16, u16);

/// Invert outage windows into power-on windows over a full day.
///
/// Outages 00:00–01:30, 08:30–12:00, 19:00–22:30 become power windows
/// 01:30–08:30, 12:00–19:00, 22:30–24:00.
pub fn electricity_periods(outages: &[MinuteWindow]) -> Vec<MinuteWindow> {
    let mut sorted: Vec<MinuteWindow> = outages.to_vec();
    sorted.sort_unstable();

    if sorted.is_empty() {
        return vec![(0, DAY_MINUTES)];
    }

    let mut periods = Vec::new();
    if sorted[0].0 > 0 {
        periods.push((0, sorted[0].0));
    }
    for pair in sorted.windows(2) {
        let gap_start = pair[0].1;
        let gap_end = pair[1].0;
        if gap_start < gap_end {
            periods.push((gap_start, gap_end));
        }
    }
    if let Some(last) = sorted.last()
        && last.1 < DAY_MINUTES
    {
        periods.push((last.1, DAY_MINUTES));
    }
    periods
}

/// Windows where every participant has power at once.
///
/// Sweep over all window boundary points; an elementary segment is common
/// when each participant's power windows cover its start. Adjacent common
/// segments are merged.
pub fn common_electricity_periods(outage_sets: &[Vec<MinuteWindow>]) -> Vec<MinuteWindow> {
    if outage_sets.is_empty() {
        return Vec::new();
    }
    let power: Vec<Vec<MinuteWindow>> = outage_sets
        .iter()
        .map(|outages| electricity_periods(outages))
        .collect();
    if power.len() == 1 {
        return power.into_iter().next().unwrap_or_default();
    }

    let mut points: Vec<u16> = vec![0, DAY_MINUTES];
    for windows in &power {
        for &(start, end) in windows {
            points.push(start);
            points.push(end);
        }
    }
    points.sort_unstable();
    points.dedup();

    let mut common: Vec<MinuteWindow> = Vec::new();
    for pair in points.windows(2) {
        let (point, next) = (pair[0], pair[1]);
        let everyone_on = power
            .iter()
            .all(|windows| windows.iter().any(|&(s, e)| s <= point && point < e));
        if everyone_on {
            match common.last_mut() {
                Some(last) if last.1 == point => last.1 = next,
                _ => common.push((point, next)),
            }
        }
    }
    common
}

/// Human-readable summary of common power windows for one day.
pub fn format_report(day_name: &str, periods: &[MinuteWindow]) -> String {
    if periods.is_empty() {
        return format!("{day_name}: ❌ no window when everyone has power");
    }
    let mut lines = vec![format!("{day_name}: ✅")];
    for &(start, end) in periods {
        lines.push(format!("  {} – {}", minutes_to_hhmm(start), minutes_to_hhmm(end)));
    }
    lines.join("\n")
}
