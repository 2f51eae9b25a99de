//! Upstream schedule client — fetch + defensive wire parsing.
//!
//! Wire format (one object per region, group ids as keys):
//! ```json
//! {
//!   "1.1": {
//!     "today":    { "date": "2025-11-09T00:00:00+02:00",
//!                   "slots": [ { "start": 0, "end": 90, "type": "Definite" }, ... ] },
//!     "tomorrow": { ... }
//!   }
//! }
//! ```
//! Slot times are minutes since midnight. "NotPlanned" slots are filler
//! between outages and are skipped.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use serde::Deserialize;

use gridwatch_core::config::{ProviderConfig, RegionConfig};
use gridwatch_core::error::UpstreamError;
use gridwatch_core::types::{IntervalStatus, OutageInterval, ScheduleSnapshot};

/// HTTP client for the planned-outage endpoint.
pub struct ProviderClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ProviderClient {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    fn schedule_url(&self, region: &RegionConfig) -> String {
        format!(
            "{}/regions/{}/dsos/{}/planned-outages",
            self.base_url, region.region_id, region.dso_id
        )
    }

    /// Fetch the current schedule document for one region.
    /// Exactly one network call; the caller owns any retry policy.
    pub async fn fetch_schedule(
        &self,
        region: &RegionConfig,
    ) -> Result<ScheduleSnapshot, UpstreamError> {
        let url = self.schedule_url(region);
        tracing::debug!("Fetching schedule for '{}' from {url}", region.name);

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| UpstreamError::Unreachable(format!("GET {url}: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(UpstreamError::RateLimited);
        }
        if !status.is_success() {
            return Err(UpstreamError::Unreachable(format!("HTTP {status} from {url}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::MalformedResponse(format!("invalid JSON: {e}")))?;

        parse_snapshot(&region.name, &body)
    }
}

// --- Wire types (unknown fields ignored by serde) ---

#[derive(Debug, Default, Deserialize)]
struct WireGroup {
    #[serde(default)]
    today: Option<WireDay>,
    #[serde(default)]
    tomorrow: Option<WireDay>,
}

#[derive(Debug, Default, Deserialize)]
struct WireDay {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    slots: Vec<WireSlot>,
}

#[derive(Debug, Deserialize)]
struct WireSlot {
    #[serde(default)]
    start: Option<u32>,
    #[serde(default)]
    end: Option<u32>,
    #[serde(rename = "type", default)]
    kind: String,
}

/// Parse a schedule document into a snapshot. Pure — no I/O.
///
/// Root entries that are not group objects are ignored; a document with no
/// usable groups at all is malformed.
pub fn parse_snapshot(
    region: &str,
    body: &serde_json::Value,
) -> Result<ScheduleSnapshot, UpstreamError> {
    let root = body.as_object().ok_or_else(|| {
        UpstreamError::MalformedResponse("schedule document root is not an object".into())
    })?;

    let mut groups: BTreeMap<String, Vec<OutageInterval>> = BTreeMap::new();

    for (group_id, value) in root {
        let wire: WireGroup = match serde_json::from_value(value.clone()) {
            Ok(w) => w,
            Err(e) => {
                tracing::debug!("Skipping non-group root entry '{group_id}': {e}");
                continue;
            }
        };
        if wire.today.is_none() && wire.tomorrow.is_none() {
            continue;
        }

        let mut intervals = Vec::new();
        for day in [wire.today, wire.tomorrow].into_iter().flatten() {
            parse_day(group_id, &day, &mut intervals)?;
        }
        groups.insert(group_id.clone(), intervals);
    }

    if groups.is_empty() {
        return Err(UpstreamError::MalformedResponse(
            "no schedule groups in response".into(),
        ));
    }

    let snapshot = ScheduleSnapshot::new(region, groups);
    tracing::debug!(
        "Parsed snapshot for '{region}': {} groups, {} intervals, version {}",
        snapshot.groups.len(),
        snapshot.interval_count(),
        &snapshot.version[..12]
    );
    Ok(snapshot)
}

fn parse_day(
    group_id: &str,
    day: &WireDay,
    out: &mut Vec<OutageInterval>,
) -> Result<(), UpstreamError> {
    let date_str = day.date.as_deref().ok_or_else(|| {
        UpstreamError::MalformedResponse(format!("group {group_id}: day without a date"))
    })?;
    let date = parse_date(date_str).ok_or_else(|| {
        UpstreamError::MalformedResponse(format!("group {group_id}: bad date '{date_str}'"))
    })?;

    for slot in &day.slots {
        let status = match slot.kind.as_str() {
            "Definite" => IntervalStatus::Scheduled,
            "Cancelled" => IntervalStatus::Cancelled,
            "Ongoing" | "Emergency" => IntervalStatus::Ongoing,
            // "NotPlanned" and anything new the provider invents: filler.
            _ => continue,
        };
        let (start, end) = match (slot.start, slot.end) {
            (Some(s), Some(e)) => (s, e),
            _ => {
                return Err(UpstreamError::MalformedResponse(format!(
                    "group {group_id}: outage slot without start/end"
                )));
            }
        };
        if start >= end || end > 24 * 60 {
            return Err(UpstreamError::MalformedResponse(format!(
                "group {group_id}: bad slot bounds {start}..{end}"
            )));
        }
        out.push(OutageInterval {
            group_id: group_id.to_string(),
            date,
            start_minute: start as u16,
            end_minute: end as u16,
            status,
        });
    }
    Ok(())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    // Some deployments publish a bare date.
    s.get(..10).and_then(|d| d.parse().ok())
}
