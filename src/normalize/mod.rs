// src/normalize/mod.rs
//! Normalizer: maps adapter output into canonical observations.
//!
//! `normalize` is pure and total. A malformed field never fails the record; it becomes
//! `None` (or `MatchStatus::Unknown`) and is reported as a [`NormalizationAnomaly`] by
//! [`normalize_checked`] so the caller can count it.

pub mod aliases;
pub mod time;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::model::{MatchStatus, Observation, RawObservation, RawScore, SourceId};
pub use aliases::AliasTable;

/// A field the normalizer had to substitute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizationAnomaly {
    MissingTeam,
    UnknownStatus(String),
    MalformedScore(String),
    MalformedKickoff,
    MalformedObservedAt,
    /// Score reported with a status that cannot carry one; the score was dropped.
    ScoreWithoutPlay(MatchStatus),
}

impl NormalizationAnomaly {
    pub fn kind(&self) -> &'static str {
        match self {
            NormalizationAnomaly::MissingTeam => "missing_team",
            NormalizationAnomaly::UnknownStatus(_) => "unknown_status",
            NormalizationAnomaly::MalformedScore(_) => "malformed_score",
            NormalizationAnomaly::MalformedKickoff => "malformed_kickoff",
            NormalizationAnomaly::MalformedObservedAt => "malformed_observed_at",
            NormalizationAnomaly::ScoreWithoutPlay(_) => "score_without_play",
        }
    }
}

/// Decode entities, strip diacritics, lowercase and split on anything that is not
/// `[a-z0-9]`.
pub fn fold_tokens(raw: &str) -> Vec<String> {
    let decoded = html_escape::decode_html_entities(raw);
    let folded: String = decoded
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().map(str::to_string).collect()
}

/// Map a status token from any adapter vocabulary onto the canonical enum.
pub fn parse_status(raw: &str) -> Option<MatchStatus> {
    let token: String = raw
        .trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    let status = match token.as_str() {
        "live" | "inprogress" | "in" | "inplay" | "playing" | "1h" | "2h" | "ht" | "halftime"
        | "firsthalf" | "secondhalf" | "et" | "extratime" | "pen" | "penalties" | "break" => {
            MatchStatus::Live
        }
        "finished" | "result" | "post" | "ft" | "fulltime" | "ended" | "aet" | "ap" | "final" => {
            MatchStatus::Finished
        }
        "scheduled" | "fixture" | "pre" | "notstarted" | "ns" | "upcoming" => {
            MatchStatus::Scheduled
        }
        "postponed" | "pst" | "delayed" => MatchStatus::Postponed,
        "cancelled" | "canceled" | "canc" | "abandoned" => MatchStatus::Cancelled,
        _ => return None,
    };
    Some(status)
}

/// Non-negative integer score, or `None`.
pub fn parse_score(raw: &RawScore) -> Option<u32> {
    match raw {
        RawScore::Int(v) => u32::try_from(*v).ok(),
        RawScore::Text(s) => s.trim().parse::<u32>().ok(),
    }
}

fn clean_display(raw: Option<&str>) -> Option<String> {
    let s = raw?;
    let decoded = html_escape::decode_html_entities(s);
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Normalize one adapter record.
pub fn normalize(raw: &RawObservation, aliases: &AliasTable) -> Observation {
    normalize_checked(raw, aliases).0
}

/// Normalize one adapter record and report every substituted field.
pub fn normalize_checked(
    raw: &RawObservation,
    aliases: &AliasTable,
) -> (Observation, Vec<NormalizationAnomaly>) {
    let mut anomalies = Vec::new();

    let home_display = clean_display(raw.home_team.as_deref()).unwrap_or_default();
    let away_display = clean_display(raw.away_team.as_deref()).unwrap_or_default();
    let home_team = aliases.team_key(&home_display);
    let away_team = aliases.team_key(&away_display);
    if home_team.is_empty() || away_team.is_empty() {
        anomalies.push(NormalizationAnomaly::MissingTeam);
    }

    let competition_display = clean_display(raw.competition.as_deref());
    let competition = competition_display
        .as_deref()
        .map(|c| aliases.competition_key(c))
        .unwrap_or_default();

    let status = match raw.status.as_deref() {
        Some(s) => parse_status(s).unwrap_or_else(|| {
            anomalies.push(NormalizationAnomaly::UnknownStatus(s.to_string()));
            MatchStatus::Unknown
        }),
        None => MatchStatus::Unknown,
    };

    let mut score = |field: &Option<RawScore>| -> Option<u32> {
        let raw_score = field.as_ref()?;
        let parsed = parse_score(raw_score);
        if parsed.is_none() {
            anomalies.push(NormalizationAnomaly::MalformedScore(format!("{raw_score:?}")));
        }
        parsed
    };
    let mut home_score = score(&raw.home_score);
    let mut away_score = score(&raw.away_score);

    if !status.carries_score() && (home_score.is_some() || away_score.is_some()) {
        anomalies.push(NormalizationAnomaly::ScoreWithoutPlay(status));
        home_score = None;
        away_score = None;
    }

    let kickoff_time = raw.kickoff.as_ref().and_then(|k| {
        let parsed = time::resolve_timestamp(k);
        if parsed.is_none() {
            anomalies.push(NormalizationAnomaly::MalformedKickoff);
        }
        parsed
    });

    let observed_at = match raw.observed_at.as_ref() {
        Some(ts) => time::resolve_timestamp(ts).unwrap_or_else(|| {
            anomalies.push(NormalizationAnomaly::MalformedObservedAt);
            raw.fetched_at
        }),
        None => raw.fetched_at,
    };

    let watch_link = match raw.source {
        SourceId::Streamed => raw
            .watch_link
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    };

    let provider_match_id = raw
        .provider_match_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let obs = Observation {
        source_id: raw.source,
        provider_match_id,
        home_team,
        away_team,
        home_display,
        away_display,
        competition,
        competition_display,
        kickoff_time,
        status,
        home_score,
        away_score,
        observed_at,
        watch_link,
        minute: raw.minute,
        extra_minute: raw.extra_minute,
        venue: clean_display(raw.venue.as_deref()),
    };
    (obs, anomalies)
}
