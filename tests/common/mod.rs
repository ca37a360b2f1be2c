// Shared helpers for integration tests.
#![allow(dead_code)]

use axum::{
    body::{self, Body},
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use footballapi::config::AppConfig;
use footballapi::model::{RawObservation, RawScore, RawTimestamp, SourceId};
use footballapi::normalize::AliasTable;
use footballapi::providers::{SourceAdapter, StaticAdapter};
use footballapi::service::ScoreService;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // for oneshot

/// Adapter record with the fields every test cares about.
pub fn raw(
    source: SourceId,
    home: &str,
    away: &str,
    status: Option<&str>,
    score: Option<(i64, i64)>,
    kickoff: DateTime<Utc>,
    observed_at: DateTime<Utc>,
) -> RawObservation {
    let mut r = RawObservation::new(source, observed_at);
    r.provider_match_id = Some(format!("{source}-{home}-{away}"));
    r.home_team = Some(home.to_string());
    r.away_team = Some(away.to_string());
    r.status = status.map(str::to_string);
    r.home_score = score.map(|s| RawScore::Int(s.0));
    r.away_score = score.map(|s| RawScore::Int(s.1));
    r.kickoff = Some(RawTimestamp::Iso(kickoff.to_rfc3339()));
    r.observed_at = Some(RawTimestamp::Iso(observed_at.to_rfc3339()));
    r
}

pub fn adapter(source: SourceId, records: Vec<RawObservation>) -> Arc<dyn SourceAdapter> {
    Arc::new(StaticAdapter::new(source, records))
}

pub fn test_config() -> AppConfig {
    AppConfig {
        cache_ttl: Duration::from_secs(60),
        ..AppConfig::default()
    }
}

pub fn service_with(adapters: Vec<Arc<dyn SourceAdapter>>, cfg: AppConfig) -> Arc<ScoreService> {
    Arc::new(ScoreService::new(adapters, AliasTable::default_seed(), cfg))
}

pub fn app_with(adapters: Vec<Arc<dyn SourceAdapter>>) -> Router {
    footballapi::router(service_with(adapters, test_config()))
}

/// GET `uri` and decode the JSON body.
pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, HeaderMap, Value) {
    let req = Request::get(uri).body(Body::empty()).expect("request build");
    let resp = app.clone().oneshot(req).await.expect("router response");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = body::to_bytes(resp.into_body(), 1_048_576)
        .await
        .expect("body bytes");
    let json = serde_json::from_slice(&bytes).expect("json body");
    (status, headers, json)
}

pub fn cache_header(headers: &HeaderMap) -> String {
    headers
        .get("x-cache")
        .expect("X-Cache header must be present")
        .to_str()
        .expect("X-Cache header must be valid ASCII")
        .to_string()
}
