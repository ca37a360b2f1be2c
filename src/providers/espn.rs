// src/providers/espn.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::types::{FetchError, Mode, SourceAdapter};
use super::{at, id_of, score_of, text_at, timestamp_of};
use crate::model::{RawObservation, RawTimestamp, SourceId};

pub const ESPN_SCOREBOARD_URL: &str =
    "https://site.api.espn.com/apis/site/v2/sports/soccer/all/scoreboard";

// "67'", "90'+3'" -> 67, 90
static CLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)(?:\+(\d+))?").unwrap());

pub struct EspnAdapter {
    mode: Mode,
}

impl EspnAdapter {
    pub fn from_fixture(json: impl Into<String>) -> Self {
        Self {
            mode: Mode::Fixture(json.into()),
        }
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self::with_url(ESPN_SCOREBOARD_URL, client)
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

/// Status token from `status.type`. Postponement and cancellation only show up in the
/// free-text fields, so those are checked before the coarse `state`.
fn status_token(status_type: Option<&Value>) -> Option<String> {
    let st = status_type?;
    let field = |k: &str| {
        st.get(k)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_ascii_lowercase()
    };
    let state = field("state");
    let haystack = format!(
        "{} {} {} {}",
        field("name"),
        state,
        field("description"),
        field("shortDetail")
    );

    if haystack.contains("postponed") {
        return Some("postponed".into());
    }
    if haystack.contains("canceled") || haystack.contains("cancelled") {
        return Some("cancelled".into());
    }
    if !state.is_empty() {
        return Some(state);
    }
    text_at(st, &["name"])
}

/// `"90'+3'"` → `(90, Some(3))`.
fn clock_minute(display_clock: Option<&str>) -> Option<(u32, Option<u32>)> {
    let caps = CLOCK.captures(display_clock?)?;
    let minute = caps.get(1)?.as_str().parse().ok()?;
    let extra = caps.get(2).and_then(|e| e.as_str().parse().ok());
    Some((minute, extra))
}

/// Parse the scoreboard JSON.
pub fn parse_scoreboard(body: &str, fetched_at: DateTime<Utc>) -> Result<Vec<RawObservation>, FetchError> {
    let payload: Value =
        serde_json::from_str(body).map_err(|e| FetchError::parse(SourceId::Espn, e.to_string()))?;
    if !payload.is_object() {
        return Err(FetchError::parse(SourceId::Espn, "payload is not an object"));
    }

    let events = payload.get("events").and_then(Value::as_array);
    let mut out = Vec::new();
    for event in events.into_iter().flatten() {
        let Some(comp) = at(event, &["competitions"])
            .and_then(Value::as_array)
            .and_then(|c| c.first())
        else {
            continue;
        };
        let competitors: Vec<&Value> = comp
            .get("competitors")
            .and_then(Value::as_array)
            .map(|c| c.iter().collect())
            .unwrap_or_default();

        let tagged = |side: &str| {
            competitors
                .iter()
                .copied()
                .find(|c| c.get("homeAway").and_then(Value::as_str) == Some(side))
        };
        let (home, away) = match (tagged("home"), tagged("away")) {
            (Some(h), Some(a)) => (h, a),
            _ if competitors.len() >= 2 => (competitors[0], competitors[1]),
            _ => continue,
        };

        let mut raw = RawObservation::new(SourceId::Espn, fetched_at);
        raw.provider_match_id = id_of(event.get("id"));
        raw.competition = text_at(event, &["league", "name"]).or_else(|| {
            comp.get("notes")
                .and_then(Value::as_array)
                .and_then(|n| n.first())
                .and_then(|n| text_at(n, &["headline"]))
        });
        raw.home_team = text_at(home, &["team", "displayName"]);
        raw.away_team = text_at(away, &["team", "displayName"]);
        raw.home_score = score_of(home.get("score"));
        raw.away_score = score_of(away.get("score"));
        raw.status = status_token(at(comp, &["status", "type"]));
        if let Some((minute, extra)) =
            clock_minute(at(comp, &["status", "displayClock"]).and_then(Value::as_str))
        {
            raw.minute = Some(minute);
            raw.extra_minute = extra;
        }
        raw.kickoff = timestamp_of(comp.get("startDate")).or_else(|| timestamp_of(event.get("date")));
        raw.observed_at = Some(RawTimestamp::Iso(fetched_at.to_rfc3339()));
        raw.venue = text_at(comp, &["venue", "fullName"]);
        out.push(raw);
    }
    Ok(out)
}

#[async_trait]
impl SourceAdapter for EspnAdapter {
    fn id(&self) -> SourceId {
        SourceId::Espn
    }

    async fn fetch(&self) -> Result<Vec<RawObservation>, FetchError> {
        let body = self.mode.load(SourceId::Espn, "application/json").await?;
        parse_scoreboard(&body, Utc::now())
    }
}
