//! # GridWatch Provider
//!
//! Client for the upstream planned-outage API. One bounded HTTP GET per
//! fetch, defensive parsing into the internal snapshot model, typed errors.
//! No retries here — retry policy belongs to the poll loop.

pub mod client;

pub use client::{ProviderClient, parse_snapshot};
