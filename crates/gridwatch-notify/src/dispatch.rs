//! Notification dispatch — maps a schedule diff to affected subscribers and
//! sends per-subscriber messages. Best-effort: one blocked chat never aborts
//! the batch. At-most-once per diff version via the store's delivery records.

use std::sync::Arc;

use async_trait::async_trait;

use gridwatch_core::error::Result;
use gridwatch_core::types::{DispatchReport, ScheduleDiff};
use gridwatch_store::ScheduleStore;

use crate::render;
use crate::telegram::TelegramClient;

/// Chat transport seam. The real implementation is the Telegram client;
/// tests substitute a recorder.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;
}

#[async_trait]
impl Transport for TelegramClient {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(chat_id, text).await
    }
}

/// Dispatches diff results to subscribers through a transport.
pub struct Dispatcher<T: Transport> {
    store: Arc<ScheduleStore>,
    transport: Arc<T>,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(store: Arc<ScheduleStore>, transport: Arc<T>) -> Self {
        Self { store, transport }
    }

    /// Deliver one diff to everyone it affects.
    ///
    /// Store lookups propagate as errors (the cycle aborts and retries next
    /// tick); individual send failures only bump the `failed` count.
    pub async fn dispatch(&self, region: &str, diff: &ScheduleDiff) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();
        if diff.is_empty() {
            return Ok(report);
        }

        for group_diff in &diff.groups {
            let subscribers = self.store.subscribers_for_group(&group_diff.group_id)?;
            for subscriber in subscribers {
                let delivered = self.store.was_delivered(
                    subscriber.chat_id,
                    subscriber.user_id,
                    region,
                    &diff.version,
                )?;
                if delivered {
                    report.skipped += 1;
                    continue;
                }

                let text = render::subscriber_message(&subscriber, group_diff);
                match self.transport.send_text(subscriber.chat_id, &text).await {
                    Ok(()) => {
                        self.store.mark_delivered(
                            subscriber.chat_id,
                            subscriber.user_id,
                            region,
                            &diff.version,
                        )?;
                        report.sent += 1;
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Delivery to {} in chat {} failed: {e}",
                            subscriber.username,
                            subscriber.chat_id
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            "Dispatched '{region}' diff {}: {} sent, {} failed, {} skipped",
            &diff.version[..12.min(diff.version.len())],
            report.sent,
            report.failed,
            report.skipped
        );
        Ok(report)
    }
}
