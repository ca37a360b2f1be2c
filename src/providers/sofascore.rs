// src/providers/sofascore.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::types::{FetchError, Mode, SourceAdapter};
use super::{at, id_of, score_of, text_at, timestamp_of};
use crate::model::{RawObservation, RawTimestamp, SourceId};

pub const SOFASCORE_LIVE_URL: &str = "https://www.sofascore.com/api/v1/sport/football/events/live";

pub struct SofascoreAdapter {
    mode: Mode,
}

impl SofascoreAdapter {
    pub fn from_fixture(json: impl Into<String>) -> Self {
        Self {
            mode: Mode::Fixture(json.into()),
        }
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self::with_url(SOFASCORE_LIVE_URL, client)
    }

    pub fn with_url(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        }
    }
}

/// Text fields first, then the numeric status code table.
fn status_token(status: Option<&Value>) -> Option<String> {
    let st = status?;
    let kind = text_at(st, &["type"]).unwrap_or_default().to_ascii_lowercase();
    let description = text_at(st, &["description"]).unwrap_or_default().to_ascii_lowercase();
    let haystack = format!("{kind} {description}");

    let token = if haystack.contains("inprogress") {
        "live"
    } else if haystack.contains("finished") {
        "finished"
    } else if haystack.contains("postponed") {
        "postponed"
    } else if haystack.contains("cancel") {
        "cancelled"
    } else {
        match st.get("code").and_then(Value::as_i64) {
            Some(1..=5) => "scheduled",
            Some(6..=10) | Some(31..=33) => "live",
            Some(100) | Some(120) => "finished",
            _ => return if kind.is_empty() { None } else { Some(kind) },
        }
    };
    Some(token.to_string())
}

/// Parse the live events JSON.
pub fn parse_events(body: &str, fetched_at: DateTime<Utc>) -> Result<Vec<RawObservation>, FetchError> {
    let payload: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::parse(SourceId::Sofascore, e.to_string()))?;
    if !payload.is_object() {
        return Err(FetchError::parse(SourceId::Sofascore, "payload is not an object"));
    }

    let events = payload.get("events").and_then(Value::as_array);
    let mut out = Vec::new();
    for event in events.into_iter().flatten().filter(|e| e.is_object()) {
        let home = text_at(event, &["homeTeam", "name"]);
        let away = text_at(event, &["awayTeam", "name"]);
        if home.is_none() || away.is_none() {
            continue;
        }

        let mut raw = RawObservation::new(SourceId::Sofascore, fetched_at);
        raw.provider_match_id = id_of(event.get("id"));
        raw.competition = text_at(event, &["tournament", "uniqueTournament", "name"])
            .or_else(|| text_at(event, &["tournament", "name"]));
        raw.home_team = home;
        raw.away_team = away;
        raw.home_score = score_of(at(event, &["homeScore", "current"]));
        raw.away_score = score_of(at(event, &["awayScore", "current"]));
        raw.status = status_token(event.get("status"));
        raw.kickoff = match event.get("startTimestamp").and_then(Value::as_i64) {
            Some(secs) => Some(RawTimestamp::UnixSeconds(secs)),
            None => timestamp_of(event.get("startTimestamp")),
        };
        raw.observed_at = Some(RawTimestamp::Iso(fetched_at.to_rfc3339()));
        out.push(raw);
    }
    Ok(out)
}

#[async_trait]
impl SourceAdapter for SofascoreAdapter {
    fn id(&self) -> SourceId {
        SourceId::Sofascore
    }

    async fn fetch(&self) -> Result<Vec<RawObservation>, FetchError> {
        let body = self.mode.load(SourceId::Sofascore, "application/json").await?;
        parse_events(&body, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawScore;
    use serde_json::json;

    #[test]
    fn status_codes_and_text() {
        assert_eq!(status_token(Some(&json!({"type": "inprogress"}))).as_deref(), Some("live"));
        assert_eq!(status_token(Some(&json!({"code": 7}))).as_deref(), Some("live"));
        assert_eq!(status_token(Some(&json!({"code": 100}))).as_deref(), Some("finished"));
        assert_eq!(status_token(Some(&json!({"code": 3}))).as_deref(), Some("scheduled"));
        assert_eq!(
            status_token(Some(&json!({"description": "Cancelled"}))).as_deref(),
            Some("cancelled")
        );
        assert_eq!(status_token(Some(&json!({"code": 70}))), None);
    }

    #[test]
    fn parses_live_events_fixture() {
        let body = r#"{"events":[
  {"id":11,"tournament":{"name":"Premier League, Round 32","uniqueTournament":{"name":"Premier League"}},
   "homeTeam":{"name":"Arsenal"},"awayTeam":{"name":"Chelsea"},
   "homeScore":{"current":2},"awayScore":{"current":1},
   "status":{"code":7,"description":"2nd half","type":"inprogress"},
   "startTimestamp":1744466400},
  {"id":12,"homeTeam":{"name":"Nameless"}},
  "junk"
]}"#;
        let rows = parse_events(body, Utc::now()).unwrap();
        assert_eq!(rows.len(), 1);
        let r = &rows[0];
        assert_eq!(r.provider_match_id.as_deref(), Some("11"));
        assert_eq!(r.competition.as_deref(), Some("Premier League"));
        assert_eq!(r.home_score, Some(RawScore::Int(2)));
        assert_eq!(r.status.as_deref(), Some("live"));
        assert_eq!(r.kickoff, Some(RawTimestamp::UnixSeconds(1_744_466_400)));
    }
}
