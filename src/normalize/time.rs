// src/normalize/time.rs
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::model::RawTimestamp;

/// Layouts seen upstream without an offset; all are read as UTC.
const NAIVE_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 string into UTC. Accepts RFC 3339 and the offset-less forms ESPN
/// and Goal use (`2024-05-01T19:00Z`, `2024-05-01T19:00:00`).
pub fn parse_iso_utc(value: &str) -> Option<DateTime<Utc>> {
    let cleaned = value.trim();
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(cleaned) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = cleaned.strip_suffix('Z').unwrap_or(cleaned);
    NAIVE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(naive, layout).ok())
        .map(|dt| Utc.from_utc_datetime(&dt))
}

pub fn from_unix_seconds(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

pub fn from_unix_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Convert whatever the adapter captured into an absolute UTC timestamp.
pub fn resolve_timestamp(raw: &RawTimestamp) -> Option<DateTime<Utc>> {
    match raw {
        RawTimestamp::Iso(s) => parse_iso_utc(s),
        RawTimestamp::UnixSeconds(s) => from_unix_seconds(*s),
        RawTimestamp::UnixMillis(ms) => from_unix_millis(*ms),
    }
}
