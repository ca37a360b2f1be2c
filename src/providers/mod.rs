// src/providers/mod.rs
//! Source adapters. Each adapter turns one upstream payload into `RawObservation`s and
//! does no judging of its own: unparseable values are passed through for the normalizer.

pub mod espn;
pub mod goal;
pub mod sofascore;
pub mod streamed;
pub mod types;

use serde_json::Value;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::model::{RawScore, RawTimestamp};
pub use types::{FetchError, SourceAdapter, StaticAdapter};

/// Adapters for every upstream, sharing one HTTP client.
pub fn default_adapters(cfg: &AppConfig) -> Result<Vec<Arc<dyn SourceAdapter>>, reqwest::Error> {
    let client = types::build_client(cfg.source_timeout, cfg.insecure_tls)?;
    if cfg.insecure_tls {
        tracing::warn!(target: "providers", "TLS certificate verification is disabled");
    }
    Ok(vec![
        Arc::new(goal::GoalAdapter::from_client(client.clone())),
        Arc::new(espn::EspnAdapter::from_client(client.clone())),
        Arc::new(sofascore::SofascoreAdapter::from_client(client.clone())),
        Arc::new(streamed::StreamedAdapter::from_client(client)),
    ])
}

/// Walk a path of object keys.
pub(crate) fn at<'a>(v: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(v, |cur, key| cur.get(*key))
}

/// Non-empty string field.
pub(crate) fn text_at(v: &Value, path: &[&str]) -> Option<String> {
    match at(v, path)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Upstream ids come as numbers or strings.
pub(crate) fn id_of(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn score_of(v: Option<&Value>) -> Option<RawScore> {
    match v? {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(RawScore::Int(i)),
            None => Some(RawScore::Text(n.to_string())),
        },
        Value::String(s) => Some(RawScore::Text(s.clone())),
        _ => None,
    }
}

pub(crate) fn u32_of(v: Option<&Value>) -> Option<u32> {
    match v? {
        Value::Number(n) => n.as_u64().and_then(|x| u32::try_from(x).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Strings are ISO-8601; numbers above 10^11 are milliseconds, smaller ones seconds.
pub(crate) fn timestamp_of(v: Option<&Value>) -> Option<RawTimestamp> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(RawTimestamp::Iso(s.clone())),
        Value::Number(n) => {
            let x = n.as_i64()?;
            if x.abs() >= 100_000_000_000 {
                Some(RawTimestamp::UnixMillis(x))
            } else {
                Some(RawTimestamp::UnixSeconds(x))
            }
        }
        _ => None,
    }
}
