// src/model.rs
//! Shared data model: raw adapter output, normalized observations, merged matches
//! and the quality report attached to every response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Upstream sources. Declaration order doubles as the merge tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Goal,
    Espn,
    Sofascore,
    Streamed,
}

impl SourceId {
    pub const ALL: [SourceId; 4] = [
        SourceId::Goal,
        SourceId::Espn,
        SourceId::Sofascore,
        SourceId::Streamed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Goal => "goal",
            SourceId::Espn => "espn",
            SourceId::Sofascore => "sofascore",
            SourceId::Streamed => "streamed",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "goal" => Ok(SourceId::Goal),
            "espn" => Ok(SourceId::Espn),
            "sofascore" | "sofa" => Ok(SourceId::Sofascore),
            "streamed" => Ok(SourceId::Streamed),
            other => Err(format!("unknown source '{other}'")),
        }
    }
}

/// Canonical match status.
///
/// `Unknown` is what malformed or missing upstream statuses become. It behaves like
/// `Scheduled` for merging but never shows up in a live-only view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
    Postponed,
    Cancelled,
    Unknown,
}

impl MatchStatus {
    /// Merge priority: live > finished > postponed > cancelled > scheduled > unknown.
    pub fn priority(&self) -> u8 {
        match self {
            MatchStatus::Live => 5,
            MatchStatus::Finished => 4,
            MatchStatus::Postponed => 3,
            MatchStatus::Cancelled => 2,
            MatchStatus::Scheduled => 1,
            MatchStatus::Unknown => 0,
        }
    }

    pub fn carries_score(&self) -> bool {
        matches!(self, MatchStatus::Live | MatchStatus::Finished)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Live => "live",
            MatchStatus::Finished => "finished",
            MatchStatus::Postponed => "postponed",
            MatchStatus::Cancelled => "cancelled",
            MatchStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamp as an adapter found it upstream. Parsing happens in the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RawTimestamp {
    Iso(String),
    UnixSeconds(i64),
    UnixMillis(i64),
}

/// Untyped score as found upstream (number or string, sometimes garbage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawScore {
    Int(i64),
    Text(String),
}

/// One adapter record before normalization. Everything except the source and the fetch
/// time is optional: adapters copy what they find and leave the judging to the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub source: SourceId,
    pub provider_match_id: Option<String>,
    pub competition: Option<String>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub home_score: Option<RawScore>,
    pub away_score: Option<RawScore>,
    /// Status token in the adapter's vocabulary (e.g. "LIVE", "inprogress", "post").
    pub status: Option<String>,
    pub kickoff: Option<RawTimestamp>,
    pub observed_at: Option<RawTimestamp>,
    /// When the adapter received the payload; fallback for `observed_at`.
    pub fetched_at: DateTime<Utc>,
    pub minute: Option<u32>,
    /// Stoppage time on top of `minute` (the `3` in `90'+3'`).
    pub extra_minute: Option<u32>,
    pub venue: Option<String>,
    pub watch_link: Option<String>,
}

impl RawObservation {
    /// Empty record for `source`, fetched at `fetched_at`.
    pub fn new(source: SourceId, fetched_at: DateTime<Utc>) -> Self {
        Self {
            source,
            provider_match_id: None,
            competition: None,
            home_team: None,
            away_team: None,
            home_score: None,
            away_score: None,
            status: None,
            kickoff: None,
            observed_at: None,
            fetched_at,
            minute: None,
            extra_minute: None,
            venue: None,
            watch_link: None,
        }
    }
}

/// One source's normalized report of a match at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub source_id: SourceId,
    pub provider_match_id: Option<String>,
    /// Normalized team keys (identity-bearing).
    pub home_team: String,
    pub away_team: String,
    /// Spellings as the source printed them.
    pub home_display: String,
    pub away_display: String,
    /// Normalized competition key; empty when the source had none.
    pub competition: String,
    pub competition_display: Option<String>,
    pub kickoff_time: Option<DateTime<Utc>>,
    pub status: MatchStatus,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub observed_at: DateTime<Utc>,
    pub watch_link: Option<String>,
    pub minute: Option<u32>,
    pub extra_minute: Option<u32>,
    pub venue: Option<String>,
}

impl Observation {
    pub fn score(&self) -> Option<(u32, u32)> {
        match (self.home_score, self.away_score) {
            (Some(h), Some(a)) => Some((h, a)),
            _ => None,
        }
    }
}

/// Unordered normalized team pair; `first <= second`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamPairKey {
    pub first: String,
    pub second: String,
}

impl TeamPairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self {
                first: a.to_string(),
                second: b.to_string(),
            }
        } else {
            Self {
                first: b.to_string(),
                second: a.to_string(),
            }
        }
    }

    pub fn of(obs: &Observation) -> Self {
        Self::new(&obs.home_team, &obs.away_team)
    }
}

/// Observations believed to denote the same real match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchGroup {
    pub key: TeamPairKey,
    pub observations: Vec<Observation>,
}

/// How much the sources back up the displayed score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    /// Only one source reported the match.
    SingleSource,
    /// Several sources, and at least two of them reported the same score.
    Confirmed,
    /// Several sources, but fewer than two reported a score.
    Unconfirmed,
    ScoreConflict,
}

/// Merged, canonical record for one real match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub home_team: String,
    pub away_team: String,
    pub competition: Option<String>,
    pub kickoff_time: Option<DateTime<Utc>>,
    pub status: MatchStatus,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub sources: BTreeSet<SourceId>,
    pub last_updated: DateTime<Utc>,
    pub has_conflict: bool,
    pub watch_link: Option<String>,
    pub verification: Verification,
    pub discrepancies: Vec<String>,
    pub external_ids: BTreeMap<SourceId, String>,
    pub minute: Option<u32>,
    pub extra_minute: Option<u32>,
    pub venue: Option<String>,
    /// How far the displayed score can be trusted, in `[0, 1]`.
    pub confidence: f64,
}

/// Gate counters. `dropped_total` counts unique matches, so a match dropped for both
/// reasons adds one to each reason counter but only one to the total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    pub dropped_stale: usize,
    pub dropped_conflict: usize,
    pub dropped_total: usize,
    pub total_before_filter: usize,
    pub total_after_filter: usize,
    pub max_live_stale_seconds: u64,
    pub include_stale: bool,
    pub include_conflicts: bool,
}
