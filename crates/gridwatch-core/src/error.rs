//! Error taxonomy. Nothing here is fatal to the process — the poll loop
//! always gets another cycle.

use thiserror::Error;

/// Failures at the upstream provider boundary.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transport-level failure: timeout, DNS, connection refused, non-2xx.
    #[error("upstream unreachable: {0}")]
    Unreachable(String),
    /// The provider answered but the document is not what we expect.
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),
    /// HTTP 429 from the provider.
    #[error("upstream rate limit hit")]
    RateLimited,
}

/// Top-level GridWatch error.
#[derive(Debug, Error)]
pub enum GridWatchError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// The fetched snapshot violates its own invariants (overlapping
    /// intervals in one group). Upstream data integrity is a precondition;
    /// the analyzer refuses to repair it.
    #[error("inconsistent schedule: {0}")]
    InconsistentSchedule(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    /// Per-subscriber delivery failure; aggregated into a dispatch report,
    /// never aborts a batch.
    #[error("delivery error: {0}")]
    Delivery(String),
    /// Chat transport failure (Telegram API).
    #[error("channel error: {0}")]
    Channel(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GridWatchError>;
