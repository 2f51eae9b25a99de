//! # GridWatch Core
//!
//! Shared foundation for the GridWatch outage-notification bot:
//! - `error` — error taxonomy and the crate-wide `Result` alias
//! - `config` — TOML configuration with per-section defaults
//! - `types` — schedule snapshots, outage intervals, subscribers, diffs

pub mod config;
pub mod error;
pub mod types;

pub use config::GridWatchConfig;
pub use error::{GridWatchError, Result, UpstreamError};
pub use types::{
    DispatchReport, GroupDiff, IntervalChange, IntervalStatus, OutageInterval, ScheduleDiff,
    ScheduleSnapshot, Subscriber,
};
