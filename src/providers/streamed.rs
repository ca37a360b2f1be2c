// src/providers/streamed.rs
//! Streamed live list. Used for discovery and watch links only: it carries no scores and
//! no status, so its matches only reach a live view through another source.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::types::{FetchError, Mode, SourceAdapter};
use super::{id_of, text_at};
use crate::model::{RawObservation, RawTimestamp, SourceId};

pub const STREAMED_LIVE_URL: &str = "https://streamed.pk/api/matches/live";
pub const STREAMED_WATCH_BASE: &str = "https://streamed.pk/watch/";

pub struct StreamedAdapter {
    mode: Mode,
}

impl StreamedAdapter {
    pub fn from_fixture(json: impl Into<String>) -> Self {
        Self {
            mode: Mode::Fixture(json.into()),
        }
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self::with_url(STREAMED_LIVE_URL, client)
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

/// Team names from `teams`, falling back to an "A vs B" title.
fn team_names(item: &Value) -> (Option<String>, Option<String>) {
    let mut home = text_at(item, &["teams", "home", "name"]);
    let mut away = text_at(item, &["teams", "away", "name"]);
    if home.is_none() || away.is_none() {
        if let Some(title) = text_at(item, &["title"]) {
            if let Some((left, right)) = title.split_once(" vs ") {
                home = home.or_else(|| Some(left.trim().to_string()));
                away = away.or_else(|| Some(right.trim().to_string()));
            }
        }
    }
    (home, away)
}

/// Parse the live matches list.
pub fn parse_matches(body: &str, fetched_at: DateTime<Utc>) -> Result<Vec<RawObservation>, FetchError> {
    let payload: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::parse(SourceId::Streamed, e.to_string()))?;
    let items = payload
        .as_array()
        .ok_or_else(|| FetchError::parse(SourceId::Streamed, "payload is not a list"))?;

    let mut out = Vec::new();
    for item in items {
        let category = text_at(item, &["category"]).unwrap_or_default();
        if !category.eq_ignore_ascii_case("football") {
            continue;
        }
        let (home, away) = team_names(item);
        let id = id_of(item.get("id"));

        let mut raw = RawObservation::new(SourceId::Streamed, fetched_at);
        raw.home_team = home;
        raw.away_team = away;
        raw.kickoff = item
            .get("date")
            .and_then(Value::as_i64)
            .map(RawTimestamp::UnixMillis);
        raw.watch_link = id.as_ref().map(|id| format!("{STREAMED_WATCH_BASE}{id}"));
        raw.provider_match_id = id;
        out.push(raw);
    }
    Ok(out)
}

#[async_trait]
impl SourceAdapter for StreamedAdapter {
    fn id(&self) -> SourceId {
        SourceId::Streamed
    }

    async fn fetch(&self) -> Result<Vec<RawObservation>, FetchError> {
        let body = self.mode.load(SourceId::Streamed, "application/json").await?;
        parse_matches(&body, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_football_and_splits_titles() {
        let body = r#"[
  {"id":"arsenal-vs-chelsea","category":"football","title":"Arsenal vs Chelsea","date":1744466400000},
  {"id":"x","category":"football","teams":{"home":{"name":"Everton"},"away":{"name":"Fulham"}}},
  {"id":"lakers","category":"basketball","title":"Lakers vs Celtics"}
]"#;
        let rows = StreamedAdapter::from_fixture(body).fetch().await.unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].home_team.as_deref(), Some("Arsenal"));
        assert_eq!(rows[0].away_team.as_deref(), Some("Chelsea"));
        assert_eq!(rows[0].kickoff, Some(RawTimestamp::UnixMillis(1_744_466_400_000)));
        assert_eq!(
            rows[0].watch_link.as_deref(),
            Some("https://streamed.pk/watch/arsenal-vs-chelsea")
        );
        assert!(rows[0].home_score.is_none() && rows[0].status.is_none());
        assert_eq!(rows[1].away_team.as_deref(), Some("Fulham"));
    }

    #[test]
    fn object_payload_is_rejected() {
        assert!(parse_matches("{}", Utc::now()).is_err());
    }
}
