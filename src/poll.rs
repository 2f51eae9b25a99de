//! Poll loop — the fetch → analyze → persist → notify cycle, one task per
//! region. Regions touch disjoint store partitions, so one region's failure
//! never blocks another's.

use std::sync::Arc;
use std::time::Duration;

use gridwatch_analyzer::diff;
use gridwatch_core::config::{GridWatchConfig, PollerConfig, RegionConfig};
use gridwatch_core::error::{GridWatchError, Result};
use gridwatch_core::types::DispatchReport;
use gridwatch_notify::{Dispatcher, Transport};
use gridwatch_provider::ProviderClient;
use gridwatch_store::ScheduleStore;

/// What one completed cycle did.
#[derive(Debug)]
pub struct CycleOutcome {
    pub version: String,
    pub changed: bool,
    pub report: DispatchReport,
}

/// Run one full cycle for a region. Stages are strictly sequential; any
/// stage error aborts the cycle before the store is touched by later stages,
/// so the last good snapshot always survives a bad cycle.
pub async fn run_cycle<T: Transport>(
    region: &RegionConfig,
    provider: &ProviderClient,
    store: &ScheduleStore,
    dispatcher: &Dispatcher<T>,
    notify_on_first_run: bool,
) -> Result<CycleOutcome> {
    // Fetching
    let snapshot = provider.fetch_schedule(region).await?;

    // Analyzing — against the previous latest; a rejected snapshot is
    // never persisted.
    let previous = store.latest_snapshot(&region.name)?;
    let schedule_diff = diff(previous.as_ref(), &snapshot, notify_on_first_run)?;

    // Persisting
    store.save_snapshot(&snapshot)?;

    // Notifying
    let report = dispatcher.dispatch(&region.name, &schedule_diff).await?;

    Ok(CycleOutcome {
        version: snapshot.version,
        changed: !schedule_diff.is_empty(),
        report,
    })
}

/// Exponential backoff after `failures` consecutive failed cycles, capped.
pub fn backoff_delay(config: &PollerConfig, failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(16);
    let secs = config
        .backoff_base_secs
        .saturating_mul(1u64 << exp)
        .min(config.backoff_max_secs);
    Duration::from_secs(secs)
}

/// Spawn one polling task per configured region.
pub fn spawn_pollers<T: Transport + 'static>(
    config: &GridWatchConfig,
    store: Arc<ScheduleStore>,
    provider: Arc<ProviderClient>,
    dispatcher: Arc<Dispatcher<T>>,
) -> Vec<tokio::task::JoinHandle<()>> {
    config
        .regions
        .iter()
        .cloned()
        .map(|region| {
            let poller = config.poller.clone();
            let store = store.clone();
            let provider = provider.clone();
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                run_region_loop(region, poller, provider, store, dispatcher).await;
            })
        })
        .collect()
}

/// The per-region driver loop. Never returns; every error path ends in a
/// sleep and another attempt.
async fn run_region_loop<T: Transport>(
    region: RegionConfig,
    poller: PollerConfig,
    provider: Arc<ProviderClient>,
    store: Arc<ScheduleStore>,
    dispatcher: Arc<Dispatcher<T>>,
) {
    tracing::info!(
        "⏰ Poller started for '{}' (every {}s)",
        region.name,
        poller.interval_secs
    );
    let mut failures: u32 = 0;

    loop {
        match run_cycle(
            &region,
            &provider,
            &store,
            &dispatcher,
            poller.notify_on_first_run,
        )
        .await
        {
            Ok(outcome) => {
                failures = 0;
                if outcome.changed {
                    tracing::info!(
                        "🔔 '{}' schedule changed (version {}): {} sent, {} failed, {} skipped",
                        region.name,
                        &outcome.version[..12.min(outcome.version.len())],
                        outcome.report.sent,
                        outcome.report.failed,
                        outcome.report.skipped
                    );
                } else {
                    tracing::debug!("'{}' schedule unchanged", region.name);
                }
                tokio::time::sleep(Duration::from_secs(poller.interval_secs)).await;
            }
            Err(e) => {
                failures += 1;
                let delay = backoff_delay(&poller, failures);
                match &e {
                    GridWatchError::InconsistentSchedule(_) => {
                        // Operational alert: upstream published garbage.
                        // The last good snapshot stays in place.
                        tracing::error!("🚨 '{}': {e}", region.name);
                    }
                    _ => tracing::warn!(
                        "⚠️ '{}' cycle failed (attempt {failures}): {e}",
                        region.name
                    ),
                }
                tracing::debug!("'{}' backing off {}s", region.name, delay.as_secs());
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridwatch_core::config::ProviderConfig;
    use gridwatch_core::error::UpstreamError;
    use gridwatch_notify::Transport;
    use async_trait::async_trait;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let poller = PollerConfig {
            interval_secs: 900,
            backoff_base_secs: 30,
            backoff_max_secs: 1800,
            notify_on_first_run: false,
        };
        assert_eq!(backoff_delay(&poller, 1).as_secs(), 30);
        assert_eq!(backoff_delay(&poller, 2).as_secs(), 60);
        assert_eq!(backoff_delay(&poller, 3).as_secs(), 120);
        assert_eq!(backoff_delay(&poller, 7).as_secs(), 1800); // capped
        assert_eq!(backoff_delay(&poller, 60).as_secs(), 1800); // no overflow
    }

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn send_text(&self, _chat_id: i64, _text: &str) -> gridwatch_core::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_store_untouched() {
        let dir = std::env::temp_dir().join("gridwatch-poll-test-fetch");
        std::fs::remove_dir_all(&dir).ok();
        let store = Arc::new(ScheduleStore::open(&dir.join("test.db")).unwrap());
        let dispatcher = Dispatcher::new(store.clone(), Arc::new(NullTransport));

        // Nothing listens here; the fetch fails immediately.
        let provider = ProviderClient::new(&ProviderConfig {
            base_url: "http://127.0.0.1:9".into(),
            request_timeout_secs: 1,
        });
        let region = RegionConfig {
            name: "kyiv".into(),
            region_id: "25".into(),
            dso_id: "902".into(),
        };

        let err = run_cycle(&region, &provider, &store, &dispatcher, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GridWatchError::Upstream(UpstreamError::Unreachable(_))
        ));
        assert!(store.latest_snapshot("kyiv").unwrap().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }
}
