//! Message rendering — one message per subscriber summarizing what changed
//! for their group.

use gridwatch_core::types::{GroupDiff, IntervalStatus, OutageInterval, Subscriber};

use crate::telegram::escape_markdown;

/// Render the notification for one subscriber about one group's diff.
pub fn subscriber_message(subscriber: &Subscriber, diff: &GroupDiff) -> String {
    let mut lines = vec![format!(
        "⚡ *Schedule update for group {}*",
        escape_markdown(&diff.group_id)
    )];

    if !diff.added.is_empty() {
        lines.push(String::new());
        lines.push("➕ New outages:".into());
        for interval in &diff.added {
            lines.push(format!("  • {}", interval_line(interval)));
        }
    }
    if !diff.changed.is_empty() {
        lines.push(String::new());
        lines.push("🔁 Changed:".into());
        for change in &diff.changed {
            lines.push(format!(
                "  • {} → {}",
                interval_line(&change.before),
                interval_line(&change.after)
            ));
        }
    }
    if !diff.removed.is_empty() {
        lines.push(String::new());
        lines.push("➖ Cancelled outages:".into());
        for interval in &diff.removed {
            lines.push(format!("  • {}", interval_line(interval)));
        }
    }

    lines.push(String::new());
    lines.push(format!("Registered as: {}", escape_markdown(&subscriber.username)));
    lines.join("\n")
}

fn interval_line(interval: &OutageInterval) -> String {
    let mut line = format!("{} {}", interval.date.format("%d.%m"), interval.time_range());
    if interval.status != IntervalStatus::Scheduled {
        line.push_str(&format!(" ({})", interval.status.as_str()));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gridwatch_core::types::IntervalChange;

    fn interval(start: u16, end: u16, status: IntervalStatus) -> OutageInterval {
        OutageInterval {
            group_id: "1.1".into(),
            date: "2025-11-09".parse().unwrap(),
            start_minute: start,
            end_minute: end,
            status,
        }
    }

    #[test]
    fn test_subscriber_message_sections() {
        let subscriber = Subscriber {
            chat_id: 100,
            user_id: 1,
            username: "Ivan_K".into(),
            group_id: "1.1".into(),
            registered_at: Utc::now(),
        };
        let diff = GroupDiff {
            group_id: "1.1".into(),
            added: vec![interval(600, 720, IntervalStatus::Scheduled)],
            removed: vec![interval(0, 90, IntervalStatus::Scheduled)],
            changed: vec![IntervalChange {
                before: interval(1140, 1350, IntervalStatus::Scheduled),
                after: interval(1140, 1350, IntervalStatus::Cancelled),
            }],
        };
        let text = subscriber_message(&subscriber, &diff);
        assert!(text.contains("group 1.1"));
        assert!(text.contains("➕ New outages:"));
        assert!(text.contains("09.11 10:00–12:00"));
        assert!(text.contains("➖ Cancelled outages:"));
        assert!(text.contains("🔁 Changed:"));
        assert!(text.contains("(cancelled)"));
        // Markdown-sensitive username is escaped
        assert!(text.contains("Ivan\\_K"));
    }
}
