//! One-day extraction windows
//!
//! A run triggered at any moment of day `D` covers the whole of day `D - 1`:
//! `[D-1 00:00:00.000000, D-1 23:59:59.999999]`. Offsets on the trigger timestamp are
//! discarded, so the window is in the scheduler's wall-clock time.

use crate::error::{EtlError, Result};
use chrono::{Duration, NaiveDateTime, NaiveTime};

const TRIGGER_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"];
const QUERY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
const PARTITION_FORMAT: &str = "%Y%m%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    /// Window for the day before `execution_timestamp`'s calendar day.
    pub fn for_execution(execution_timestamp: &str) -> Result<Self> {
        let executed_at = parse_trigger_timestamp(execution_timestamp)?;
        Ok(Self::for_day_before(executed_at))
    }

    pub fn for_day_before(executed_at: NaiveDateTime) -> Self {
        let midnight = executed_at.date().and_time(NaiveTime::MIN);
        Self {
            start: midnight - Duration::days(1),
            end: midnight - Duration::microseconds(1),
        }
    }

    /// `YYYYMMDD` of the window's day, used to address the table partition
    pub fn partition_suffix(&self) -> String {
        self.start.format(PARTITION_FORMAT).to_string()
    }

    /// Query string for the source API with `:` percent-encoded
    pub fn query_string(&self) -> String {
        format!(
            "created_since={}&created_to={}",
            encode_timestamp(&self.start),
            encode_timestamp(&self.end)
        )
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start.format(QUERY_FORMAT), self.end.format(QUERY_FORMAT))
    }
}

fn encode_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(QUERY_FORMAT).to_string().replace(':', "%3A")
}

/// Parse a scheduler timestamp, ignoring any `+hh:mm` offset or trailing `Z`.
pub fn parse_trigger_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let trimmed = raw.trim();
    let without_offset = trimmed.split('+').next().unwrap_or(trimmed).trim_end_matches('Z');

    TRIGGER_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(without_offset, fmt).ok())
        .ok_or_else(|| EtlError::InvalidTimestamp(raw.to_string()))
}
