//! Telegram command front end — registration, roster, and the shared
//! power-window calculation for a chat.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};

use gridwatch_analyzer::periods::{MinuteWindow, common_electricity_periods, format_report};
use gridwatch_core::config::RegionConfig;
use gridwatch_core::error::Result;
use gridwatch_core::types::{IntervalStatus, ScheduleSnapshot, Subscriber};
use gridwatch_notify::TelegramClient;
use gridwatch_provider::ProviderClient;
use gridwatch_store::ScheduleStore;

const HELP_TEXT: &str = "⚡ GridWatch — outage schedule watcher.\n\n\
    Commands:\n\
    • 📝 /register <group> <name> — subscribe to a group (e.g. /register 1.1 Ivan)\n\
    • ❌ /unregister — remove yourself from this chat\n\
    • 👥 /users — list registered participants\n\
    • 🔍 /calculate — find windows when everyone has power\n\
    • ❓ /help — this message\n\n\
    You get an automatic message whenever your group's schedule changes.";

/// The interactive bot loop.
pub struct Bot {
    client: Arc<TelegramClient>,
    store: Arc<ScheduleStore>,
    provider: Arc<ProviderClient>,
    regions: Vec<RegionConfig>,
    /// Chats with a /calculate in flight — duplicate requests are dropped.
    calculating: Mutex<HashSet<i64>>,
}

impl Bot {
    pub fn new(
        client: Arc<TelegramClient>,
        store: Arc<ScheduleStore>,
        provider: Arc<ProviderClient>,
        regions: Vec<RegionConfig>,
    ) -> Self {
        Self {
            client,
            store,
            provider,
            regions,
            calculating: Mutex::new(HashSet::new()),
        }
    }

    /// Long-poll updates forever. Command errors are reported to the chat
    /// and logged; they never stop the loop.
    pub async fn run(&self) -> Result<()> {
        let me = self.client.get_me().await?;
        tracing::info!(
            "🤖 Bot started: @{} ({})",
            me.username.as_deref().unwrap_or("unknown"),
            me.first_name
        );

        loop {
            match self.client.get_updates().await {
                Ok(updates) => {
                    for update in updates {
                        if let Some((command, args, msg)) = update.command() {
                            self.handle_command(&command, args, msg.chat.id, msg.from.as_ref())
                                .await;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Update polling error: {e}");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                }
            }
        }
    }

    async fn handle_command(
        &self,
        command: &str,
        args: Vec<String>,
        chat_id: i64,
        from: Option<&gridwatch_notify::telegram::TelegramUser>,
    ) {
        let Some(from) = from else { return };
        let reply = match command {
            "start" | "help" => HELP_TEXT.to_string(),
            "register" => self.register(chat_id, from.id, &args),
            "unregister" => self.unregister(chat_id, from.id),
            "users" => self.users(chat_id),
            "calculate" => {
                {
                    let mut guard = self.calculating.lock().unwrap_or_else(|e| e.into_inner());
                    if !guard.insert(chat_id) {
                        tracing::debug!("Dropping duplicate /calculate for chat {chat_id}");
                        return;
                    }
                }
                let reply = self.calculate(chat_id).await;
                self.calculating
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&chat_id);
                reply
            }
            _ => return,
        };

        if let Err(e) = self.client.send_message(chat_id, &reply).await {
            tracing::warn!("Reply to chat {chat_id} failed: {e}");
        }
    }

    fn register(&self, chat_id: i64, user_id: i64, args: &[String]) -> String {
        if args.len() < 2 {
            return "❌ Wrong format.\nUse: /register <group> <name>\nExample: /register 1.1 Ivan"
                .into();
        }
        let group = &args[0];
        if !is_valid_group(group) {
            return format!("❌ '{group}' does not look like a group (expected e.g. 1.1)");
        }
        let username = args[1..].join(" ");

        let subscriber = Subscriber {
            chat_id,
            user_id,
            username: username.clone(),
            group_id: group.clone(),
            registered_at: Utc::now(),
        };
        match self.store.add_subscriber(&subscriber) {
            Ok(()) => format!(
                "✅ Hi, {username}!\nYou are registered in group {group}.\n\
                 You'll be notified when its schedule changes.\n\
                 Use /calculate to find shared power windows."
            ),
            Err(e) => {
                tracing::error!("Registration failed for chat {chat_id}: {e}");
                "❌ Registration failed, try again later".into()
            }
        }
    }

    fn unregister(&self, chat_id: i64, user_id: i64) -> String {
        match self.store.subscriber(chat_id, user_id) {
            Ok(Some(subscriber)) => match self.store.remove_subscriber(chat_id, user_id) {
                Ok(_) => format!("✅ You are removed from group {}", subscriber.group_id),
                Err(e) => {
                    tracing::error!("Unregister failed for chat {chat_id}: {e}");
                    "❌ Removal failed, try again later".into()
                }
            },
            Ok(None) => "❌ You are not registered in this chat".into(),
            Err(e) => {
                tracing::error!("Subscriber lookup failed: {e}");
                "❌ Removal failed, try again later".into()
            }
        }
    }

    fn users(&self, chat_id: i64) -> String {
        match self.store.chat_subscribers(chat_id) {
            Ok(subscribers) if subscribers.is_empty() => {
                "❌ Nobody is registered in this chat yet".into()
            }
            Ok(subscribers) => {
                let mut lines = vec!["👥 Registered participants:".to_string(), String::new()];
                for (i, s) in subscribers.iter().enumerate() {
                    lines.push(format!("{}. {} (group {})", i + 1, s.username, s.group_id));
                }
                lines.join("\n")
            }
            Err(e) => {
                tracing::error!("Roster lookup failed: {e}");
                "❌ Could not load the participant list".into()
            }
        }
    }

    async fn calculate(&self, chat_id: i64) -> String {
        let subscribers = match self.store.chat_subscribers(chat_id) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Roster lookup failed: {e}");
                return "❌ Could not load the participant list".into();
            }
        };
        if subscribers.is_empty() {
            return "❌ Nobody is registered in this chat!\nUse /register <group> <name> first"
                .into();
        }
        if subscribers.len() == 1 {
            return "⚠️ Need at least 2 participants for the analysis".into();
        }

        let snapshot = match self.current_snapshot().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Schedule unavailable for /calculate: {e}");
                return format!("❌ Could not load the schedule: {e}");
            }
        };

        let mut dates: Vec<NaiveDate> = snapshot
            .groups
            .values()
            .flatten()
            .map(|i| i.date)
            .collect();
        dates.sort_unstable();
        dates.dedup();

        let mut lines = vec!["👥 Participants:".to_string()];
        for s in &subscribers {
            lines.push(format!("  • {} (group {})", s.username, s.group_id));
        }
        for s in &subscribers {
            if !snapshot.groups.contains_key(&s.group_id) {
                lines.push(format!(
                    "⚠️ No schedule for group {} ({})",
                    s.group_id, s.username
                ));
            }
        }
        lines.push(String::new());
        lines.push("════════════════════════".into());

        for (label, date) in [("🌅 Today", dates.first()), ("🌙 Tomorrow", dates.get(1))] {
            let Some(&date) = date else { continue };
            let outage_sets: Vec<Vec<MinuteWindow>> = subscribers
                .iter()
                .map(|s| day_outages(&snapshot, &s.group_id, date))
                .collect();
            let common = common_electricity_periods(&outage_sets);
            lines.push(format_report(label, &common));
            lines.push(String::new());
        }

        lines.join("\n")
    }

    /// The stored latest snapshot of the primary region, with a live fetch
    /// as the cold-start fallback.
    async fn current_snapshot(&self) -> Result<ScheduleSnapshot> {
        let region = self.regions.first().ok_or_else(|| {
            gridwatch_core::GridWatchError::Config("no regions configured".into())
        })?;
        if let Some(snapshot) = self.store.latest_snapshot(&region.name)? {
            return Ok(snapshot);
        }
        let snapshot = self.provider.fetch_schedule(region).await?;
        Ok(snapshot)
    }
}

/// One subscriber's outage windows for one day. Cancelled outages don't
/// count — power is expected to stay on.
fn day_outages(snapshot: &ScheduleSnapshot, group_id: &str, date: NaiveDate) -> Vec<MinuteWindow> {
    snapshot
        .groups
        .get(group_id)
        .map(|intervals| {
            intervals
                .iter()
                .filter(|i| i.date == date && i.status != IntervalStatus::Cancelled)
                .map(|i| (i.start_minute, i.end_minute))
                .collect()
        })
        .unwrap_or_default()
}

/// Group ids look like "1.1", "2.2", "10.3".
fn is_valid_group(group: &str) -> bool {
    let mut parts = group.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => {
            !a.is_empty()
                && !b.is_empty()
                && a.chars().all(|c| c.is_ascii_digit())
                && b.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridwatch_core::types::OutageInterval;
    use std::collections::BTreeMap;

    #[test]
    fn test_is_valid_group() {
        assert!(is_valid_group("1.1"));
        assert!(is_valid_group("10.2"));
        assert!(!is_valid_group("1"));
        assert!(!is_valid_group("1."));
        assert!(!is_valid_group(".1"));
        assert!(!is_valid_group("1.1.1"));
        assert!(!is_valid_group("a.b"));
    }

    #[test]
    fn test_day_outages_filters_date_and_status() {
        let date: NaiveDate = "2025-11-09".parse().unwrap();
        let other: NaiveDate = "2025-11-10".parse().unwrap();
        let mk = |d: NaiveDate, start: u16, status| OutageInterval {
            group_id: "1.1".into(),
            date: d,
            start_minute: start,
            end_minute: start + 60,
            status,
        };
        let mut groups = BTreeMap::new();
        groups.insert(
            "1.1".to_string(),
            vec![
                mk(date, 0, IntervalStatus::Scheduled),
                mk(date, 600, IntervalStatus::Cancelled),
                mk(other, 300, IntervalStatus::Scheduled),
            ],
        );
        let snapshot = ScheduleSnapshot::new("kyiv", groups);
        assert_eq!(day_outages(&snapshot, "1.1", date), vec![(0, 60)]);
        assert!(day_outages(&snapshot, "9.9", date).is_empty());
    }
}
