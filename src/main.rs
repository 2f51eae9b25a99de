//! # GridWatch
//!
//! Watches published electricity-outage schedules, diffs each fetch against
//! the last known version, and notifies subscribed Telegram chats when their
//! group's schedule changes.
//!
//! Usage:
//!   gridwatch                        # poll + bot loop with ~/.gridwatch/config.toml
//!   gridwatch --config ./dev.toml    # explicit config
//!   gridwatch --once                 # single fetch/diff/notify cycle, then exit

mod bot;
mod poll;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gridwatch_core::GridWatchConfig;
use gridwatch_notify::{Dispatcher, TelegramClient};
use gridwatch_provider::ProviderClient;
use gridwatch_store::ScheduleStore;

#[derive(Parser)]
#[command(
    name = "gridwatch",
    version,
    about = "⚡ GridWatch — outage schedule watcher & Telegram notifier"
)]
struct Cli {
    /// Path to the config file (default: ~/.gridwatch/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database path override
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Run one poll cycle per region and exit
    #[arg(long)]
    once: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "gridwatch=debug"
    } else {
        "gridwatch=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => GridWatchConfig::load_from(path)?,
        None => GridWatchConfig::load()?,
    };
    if config.regions.is_empty() {
        anyhow::bail!("No regions configured");
    }

    let db_path = cli
        .db_path
        .unwrap_or_else(|| PathBuf::from(&config.storage.db_path));
    let store = Arc::new(ScheduleStore::open(&db_path)?);
    let provider = Arc::new(ProviderClient::new(&config.provider));
    let telegram = Arc::new(TelegramClient::new(config.telegram.clone()));
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), telegram.clone()));

    if cli.once {
        for region in &config.regions {
            match poll::run_cycle(
                region,
                &provider,
                &store,
                &dispatcher,
                config.poller.notify_on_first_run,
            )
            .await
            {
                Ok(outcome) => tracing::info!(
                    "'{}' cycle done (version {}, changed: {}): {} sent, {} failed, {} skipped",
                    region.name,
                    &outcome.version[..12.min(outcome.version.len())],
                    outcome.changed,
                    outcome.report.sent,
                    outcome.report.failed,
                    outcome.report.skipped
                ),
                Err(e) => tracing::error!("'{}' cycle failed: {e}", region.name),
            }
        }
        return Ok(());
    }

    if config.telegram.bot_token.is_empty() {
        anyhow::bail!("telegram.bot_token is not configured");
    }

    let pollers = poll::spawn_pollers(&config, store.clone(), provider.clone(), dispatcher);

    let bot = bot::Bot::new(telegram, store, provider, config.regions.clone());
    let result = bot.run().await;

    for handle in pollers {
        handle.abort();
    }
    result?;
    Ok(())
}
