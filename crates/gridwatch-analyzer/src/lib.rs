//! # GridWatch Analyzer
//!
//! Pure schedule analysis. Owns no state: both entry points take read-only
//! views and hand back transient results.
//!
//! - `diff` — compares the previous and current snapshot of a region into a
//!   structured added/removed/changed report per group
//! - `periods` — inverts outage windows into power-on windows and finds the
//!   windows common to a set of participants

pub mod diff;
pub mod periods;

pub use diff::diff;
pub use periods::{common_electricity_periods, electricity_periods, format_report};
