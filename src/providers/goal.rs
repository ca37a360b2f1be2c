// src/providers/goal.rs
//! Goal.com live-scores page. Match data sits in the Next.js `__NEXT_DATA__` script tag
//! under `props.pageProps.content.liveScores[]`, grouped by competition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::types::{FetchError, Mode, SourceAdapter};
use super::{at, id_of, score_of, text_at, timestamp_of, u32_of};
use crate::model::{RawObservation, SourceId};

pub const GOAL_LIVE_SCORES_URL: &str = "https://www.goal.com/en/live-scores";

static NEXT_DATA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<script id="__NEXT_DATA__" type="application/json">(.*?)</script>"#).unwrap()
});

pub struct GoalAdapter {
    mode: Mode,
}

impl GoalAdapter {
    pub fn from_fixture(html: impl Into<String>) -> Self {
        Self {
            mode: Mode::Fixture(html.into()),
        }
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self::with_url(GOAL_LIVE_SCORES_URL, client)
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

/// Parse the live-scores HTML page.
pub fn parse_page(html: &str, fetched_at: DateTime<Utc>) -> Result<Vec<RawObservation>, FetchError> {
    let caps = NEXT_DATA
        .captures(html)
        .ok_or_else(|| FetchError::parse(SourceId::Goal, "page has no __NEXT_DATA__ script"))?;
    let json = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let payload: Value = serde_json::from_str(json)
        .map_err(|e| FetchError::parse(SourceId::Goal, format!("__NEXT_DATA__: {e}")))?;

    let blocks = at(&payload, &["props", "pageProps", "content", "liveScores"])
        .and_then(Value::as_array);

    let mut out = Vec::new();
    for block in blocks.into_iter().flatten() {
        let competition = text_at(block, &["competition", "name"]);
        let matches = block.get("matches").and_then(Value::as_array);
        for m in matches.into_iter().flatten() {
            let mut raw = RawObservation::new(SourceId::Goal, fetched_at);
            raw.provider_match_id = id_of(m.get("id"));
            raw.competition = competition.clone();
            raw.home_team = text_at(m, &["teamA", "name"]).or_else(|| text_at(m, &["teamA", "short"]));
            raw.away_team = text_at(m, &["teamB", "name"]).or_else(|| text_at(m, &["teamB", "short"]));
            raw.home_score = score_of(at(m, &["score", "teamA"]));
            raw.away_score = score_of(at(m, &["score", "teamB"]));
            raw.status = text_at(m, &["status"]);
            raw.minute = u32_of(at(m, &["period", "minute"]));
            raw.extra_minute = u32_of(at(m, &["period", "extra"]));
            raw.kickoff = timestamp_of(m.get("startDate"));
            raw.observed_at =
                timestamp_of(m.get("lastUpdatedAt")).or_else(|| timestamp_of(m.get("cachedAt")));
            raw.venue = text_at(m, &["venue", "name"]);
            out.push(raw);
        }
    }
    Ok(out)
}

#[async_trait]
impl SourceAdapter for GoalAdapter {
    fn id(&self) -> SourceId {
        SourceId::Goal
    }

    async fn fetch(&self) -> Result<Vec<RawObservation>, FetchError> {
        let html = self.mode.load(SourceId::Goal, "text/html,*/*").await?;
        parse_page(&html, Utc::now())
    }
}
