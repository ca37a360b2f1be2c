// src/service.rs
//! Pull orchestrator: fetches the selected sources concurrently, runs the synchronous
//! normalize → resolve → merge → filter → gate pipeline and caches the resulting snapshot
//! per query shape.

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at, Instant};

use crate::cache::{CacheStatus, ResultCache};
use crate::config::{parse_flag, AppConfig, FilterStage};
use crate::gate::{self, GateConfig};
use crate::merge;
use crate::model::{Match, MatchStatus, QualityReport, RawObservation, SourceId};
use crate::normalize::{self, AliasTable};
use crate::providers::{FetchError, SourceAdapter};
use crate::resolve::{self, ResolverConfig};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown status '{0}'")]
    UnknownStatus(String),
    #[error("{0}")]
    UnknownSource(String),
}

/// Normalized query parameters. Two requests with the same shape share a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryShape {
    /// `None` = every status.
    pub statuses: Option<Vec<MatchStatus>>,
    /// Adapters to consult, sorted.
    pub sources: Vec<SourceId>,
    /// Lowercased league substring.
    pub league: Option<String>,
    pub include_stale: bool,
    pub include_conflicts: bool,
}

impl Default for QueryShape {
    fn default() -> Self {
        Self {
            statuses: Some(vec![MatchStatus::Live]),
            sources: SourceId::ALL.to_vec(),
            league: None,
            include_stale: false,
            include_conflicts: false,
        }
    }
}

/// One request: a shape plus the refresh flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveScoreQuery {
    pub shape: QueryShape,
    pub refresh: bool,
}

fn is_wildcard(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "" | "all" | "*")
}

fn parse_status_filter(raw: &str) -> Result<Option<Vec<MatchStatus>>, QueryError> {
    if is_wildcard(raw) {
        return Ok(None);
    }
    let mut out = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let status = if token.eq_ignore_ascii_case("unknown") {
            MatchStatus::Unknown
        } else {
            normalize::parse_status(token)
                .ok_or_else(|| QueryError::UnknownStatus(token.to_string()))?
        };
        if !out.contains(&status) {
            out.push(status);
        }
    }
    out.sort_by_key(|s| std::cmp::Reverse(s.priority()));
    Ok(Some(out))
}

fn parse_source_filter(raw: &str) -> Result<Vec<SourceId>, QueryError> {
    if is_wildcard(raw) {
        return Ok(SourceId::ALL.to_vec());
    }
    let mut out = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let id: SourceId = token.parse().map_err(QueryError::UnknownSource)?;
        out.push(id);
    }
    out.sort();
    out.dedup();
    Ok(out)
}

impl LiveScoreQuery {
    /// Parse query-string parameters. Unknown parameters are ignored; unknown status or
    /// source names are rejected.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, QueryError> {
        let flag = |k: &str| {
            params
                .get(k)
                .and_then(|v| parse_flag(v))
                .unwrap_or(false)
        };

        let statuses = match params.get("status") {
            Some(raw) => parse_status_filter(raw)?,
            None => Some(vec![MatchStatus::Live]),
        };
        let sources = match params.get("source") {
            Some(raw) => parse_source_filter(raw)?,
            None => SourceId::ALL.to_vec(),
        };
        let league = params
            .get("league")
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty());

        Ok(Self {
            shape: QueryShape {
                statuses,
                sources,
                league,
                include_stale: flag("include_stale"),
                include_conflicts: flag("include_conflicts"),
            },
            refresh: flag("refresh"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub ok: bool,
    pub count: usize,
    pub error: Option<String>,
}

/// Match as served: the merged record plus its age relative to `generated_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchView {
    #[serde(flatten)]
    pub record: Match,
    pub last_update_age_seconds: u64,
    pub is_stale: bool,
}

/// Filters as applied, echoed back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterEcho {
    pub status: String,
    pub source: String,
    pub league: Option<String>,
    pub stage: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub count: usize,
    pub matches: Vec<MatchView>,
    pub quality: QualityReport,
    pub providers: BTreeMap<SourceId, ProviderStatus>,
    pub filters: FilterEcho,
}

/// Output order: status priority desc, kickoff asc (unknown last), then "home vs away".
pub fn display_order(a: &Match, b: &Match) -> std::cmp::Ordering {
    let name = |m: &Match| format!("{} vs {}", m.home_team, m.away_team).to_lowercase();
    b.status
        .priority()
        .cmp(&a.status.priority())
        .then_with(|| a.kickoff_time.is_none().cmp(&b.kickoff_time.is_none()))
        .then_with(|| a.kickoff_time.cmp(&b.kickoff_time))
        .then_with(|| name(a).cmp(&name(b)))
        .then_with(|| a.id.cmp(&b.id))
}

/// Normalize, resolve and merge one batch of adapter records into sorted matches.
pub fn build_matches(
    raw: &[RawObservation],
    aliases: &AliasTable,
    resolver: &ResolverConfig,
) -> Vec<Match> {
    let mut observations = Vec::with_capacity(raw.len());
    for r in raw {
        let (obs, anomalies) = normalize::normalize_checked(r, aliases);
        for a in &anomalies {
            counter!("normalization_anomalies_total", "kind" => a.kind()).increment(1);
            tracing::debug!(target: "normalize", source = %r.source, anomaly = ?a, "field substituted");
        }
        observations.push(obs);
    }

    let groups = resolve::resolve(observations, resolver);
    for (a, b, sim) in resolve::near_miss_pairs(&groups) {
        tracing::info!(
            target: "resolve",
            left = %format!("{} / {}", a.first, a.second),
            right = %format!("{} / {}", b.first, b.second),
            similarity = sim,
            "near-identical team pairs kept apart; consider an alias entry"
        );
    }

    let mut matches = merge::merge_all(&groups);
    matches.sort_by(display_order);
    matches
}

fn matches_filters(m: &Match, shape: &QueryShape) -> bool {
    if let Some(statuses) = &shape.statuses {
        if !statuses.contains(&m.status) {
            return false;
        }
    }
    if let Some(needle) = &shape.league {
        let comp = m.competition.as_deref().unwrap_or_default().to_lowercase();
        if !comp.contains(needle.as_str()) {
            return false;
        }
    }
    true
}

/// Filter and gate already-merged matches at `now`.
pub fn apply_query(
    matches: Vec<Match>,
    shape: &QueryShape,
    gate_cfg: &GateConfig,
    stage: FilterStage,
    now: DateTime<Utc>,
) -> (Vec<MatchView>, QualityReport) {
    let (kept, quality) = match stage {
        FilterStage::BeforeGate => {
            let filtered: Vec<Match> = matches
                .into_iter()
                .filter(|m| matches_filters(m, shape))
                .collect();
            gate::gate(filtered, now, gate_cfg)
        }
        FilterStage::AfterGate => {
            let (gated, q) = gate::gate(matches, now, gate_cfg);
            let filtered: Vec<Match> = gated
                .into_iter()
                .filter(|m| matches_filters(m, shape))
                .collect();
            (filtered, q)
        }
    };

    if quality.dropped_stale > 0 {
        counter!("gate_dropped_total", "reason" => "stale").increment(quality.dropped_stale as u64);
    }
    if quality.dropped_conflict > 0 {
        counter!("gate_dropped_total", "reason" => "conflict")
            .increment(quality.dropped_conflict as u64);
    }

    let views = kept
        .into_iter()
        .map(|m| MatchView {
            last_update_age_seconds: gate::update_age_seconds(&m, now),
            is_stale: gate::is_stale(&m, now, gate_cfg.max_live_stale_seconds),
            record: m,
        })
        .collect();
    (views, quality)
}

fn echo(shape: &QueryShape, stage: FilterStage) -> FilterEcho {
    let status = match &shape.statuses {
        None => "all".to_string(),
        Some(s) => s.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(","),
    };
    let source = if shape.sources.len() == SourceId::ALL.len() {
        "all".to_string()
    } else {
        shape
            .sources
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",")
    };
    FilterEcho {
        status,
        source,
        league: shape.league.clone(),
        stage: match stage {
            FilterStage::BeforeGate => "before_gate",
            FilterStage::AfterGate => "after_gate",
        },
    }
}

pub struct ScoreService {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    aliases: Arc<AliasTable>,
    config: AppConfig,
    cache: ResultCache<QueryShape, Snapshot>,
}

impl ScoreService {
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, aliases: AliasTable, config: AppConfig) -> Self {
        let cache = ResultCache::new(config.cache_ttl);
        Self {
            adapters,
            aliases: Arc::new(aliases),
            config,
            cache,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Serve a query from the cache, computing a fresh snapshot when needed.
    pub async fn live_scores(&self, query: &LiveScoreQuery) -> (Arc<Snapshot>, CacheStatus) {
        let shape = &query.shape;
        self.cache
            .get_or_compute(shape, query.refresh, || self.compute(shape))
            .await
    }

    async fn compute(&self, shape: &QueryShape) -> Snapshot {
        let (raw, providers) = self.fetch_sources(&shape.sources).await;

        let t0 = std::time::Instant::now();
        let generated_at = Utc::now();
        let matches = build_matches(&raw, &self.aliases, &self.config.resolver());
        let gate_cfg = GateConfig {
            include_stale: shape.include_stale,
            include_conflicts: shape.include_conflicts,
            ..self.config.gate_defaults()
        };
        let (views, quality) =
            apply_query(matches, shape, &gate_cfg, self.config.filter_stage, generated_at);
        histogram!("pipeline_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        tracing::info!(
            target: "service",
            observations = raw.len(),
            served = views.len(),
            dropped = quality.dropped_total,
            "snapshot computed"
        );

        Snapshot {
            generated_at,
            count: views.len(),
            matches: views,
            quality,
            providers,
            filters: echo(shape, self.config.filter_stage),
        }
    }

    /// Fetch every selected adapter concurrently. A source that errors, times out or is
    /// still pending at the request deadline contributes nothing.
    async fn fetch_sources(
        &self,
        sources: &[SourceId],
    ) -> (Vec<RawObservation>, BTreeMap<SourceId, ProviderStatus>) {
        let per_source = self.config.source_timeout;
        // No deadline when the configured timeout does not fit the clock.
        let deadline = Instant::now().checked_add(self.config.request_timeout);

        let mut set = JoinSet::new();
        let mut pending: Vec<SourceId> = Vec::new();
        for adapter in self.adapters.iter().filter(|a| sources.contains(&a.id())) {
            let adapter = adapter.clone();
            let id = adapter.id();
            pending.push(id);
            set.spawn(async move {
                let started = std::time::Instant::now();
                let result = match timeout(per_source, adapter.fetch()).await {
                    Ok(r) => r,
                    Err(_) => Err(FetchError::Timeout {
                        source_id: id,
                        elapsed: per_source,
                    }),
                };
                (id, result, started.elapsed())
            });
        }

        let mut raw = Vec::new();
        let mut providers = BTreeMap::new();
        loop {
            let joined = match deadline {
                Some(at) => timeout_at(at, set.join_next()).await,
                None => Ok(set.join_next().await),
            };
            let next = match joined {
                Ok(Some(joined)) => joined,
                Ok(None) => break,
                Err(_) => {
                    set.abort_all();
                    tracing::warn!(target: "service", pending = ?pending, "request deadline reached");
                    break;
                }
            };
            let (id, result, elapsed) = match next {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(target: "service", error = %e, "fetch task failed");
                    continue;
                }
            };
            pending.retain(|p| *p != id);

            match result {
                Ok(rows) => {
                    tracing::debug!(
                        target: "service",
                        source = %id,
                        count = rows.len(),
                        ms = elapsed.as_millis() as u64,
                        "source fetched"
                    );
                    counter!("observations_total", "source" => id.as_str())
                        .increment(rows.len() as u64);
                    providers.insert(
                        id,
                        ProviderStatus {
                            ok: true,
                            count: rows.len(),
                            error: None,
                        },
                    );
                    raw.extend(rows);
                }
                Err(e) => {
                    tracing::warn!(target: "service", source = %id, error = %e, "source failed");
                    counter!("fetch_errors_total", "source" => id.as_str(), "kind" => e.kind())
                        .increment(1);
                    providers.insert(
                        id,
                        ProviderStatus {
                            ok: false,
                            count: 0,
                            error: Some(e.to_string()),
                        },
                    );
                }
            }
        }

        for id in pending {
            counter!("fetch_errors_total", "source" => id.as_str(), "kind" => "deadline")
                .increment(1);
            providers.insert(
                id,
                ProviderStatus {
                    ok: false,
                    count: 0,
                    error: Some("no result before the request deadline".to_string()),
                },
            );
        }

        (raw, providers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Verification;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeSet;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_to_live_from_all_sources() {
        let q = LiveScoreQuery::from_params(&HashMap::new()).unwrap();
        assert_eq!(q.shape, QueryShape::default());
        assert!(!q.refresh);
    }

    #[test]
    fn shape_is_normalized() {
        let a = LiveScoreQuery::from_params(&params(&[
            ("status", "finished,LIVE"),
            ("source", "sofa, espn"),
            ("league", " Premier "),
            ("refresh", "yes"),
        ]))
        .unwrap();
        let b = LiveScoreQuery::from_params(&params(&[
            ("status", "live,finished,live"),
            ("source", "espn,sofascore"),
            ("league", "premier"),
        ]))
        .unwrap();
        assert_eq!(a.shape, b.shape);
        assert!(a.refresh && !b.refresh);
        assert_eq!(a.shape.sources, vec![SourceId::Espn, SourceId::Sofascore]);
    }

    #[test]
    fn wildcards_and_unknown_tokens() {
        let q = LiveScoreQuery::from_params(&params(&[("status", "*"), ("source", "all")])).unwrap();
        assert_eq!(q.shape.statuses, None);
        assert_eq!(q.shape.sources.len(), 4);

        assert_eq!(
            LiveScoreQuery::from_params(&params(&[("status", "live,halftimeish")])),
            Err(QueryError::UnknownStatus("halftimeish".into()))
        );
        assert!(matches!(
            LiveScoreQuery::from_params(&params(&[("source", "bbc")])),
            Err(QueryError::UnknownSource(_))
        ));
    }

    #[test]
    fn flags_accept_truthy_words_only() {
        let q = LiveScoreQuery::from_params(&params(&[
            ("include_stale", "on"),
            ("include_conflicts", "maybe"),
        ]))
        .unwrap();
        assert!(q.shape.include_stale);
        assert!(!q.shape.include_conflicts);
    }

    fn merged(id: &str, status: MatchStatus, age_secs: i64, now: DateTime<Utc>) -> Match {
        Match {
            id: id.into(),
            home_team: format!("{id} home"),
            away_team: format!("{id} away"),
            competition: Some("Premier League".into()),
            kickoff_time: None,
            status,
            home_score: Some(1),
            away_score: Some(0),
            sources: BTreeSet::from([SourceId::Espn]),
            last_updated: now - Duration::seconds(age_secs),
            has_conflict: false,
            watch_link: None,
            verification: Verification::SingleSource,
            discrepancies: Vec::new(),
            external_ids: BTreeMap::new(),
            minute: None,
            extra_minute: None,
            venue: None,
            confidence: 0.68,
        }
    }

    #[test]
    fn filter_stage_decides_what_the_counters_describe() {
        let now = Utc.with_ymd_and_hms(2025, 4, 12, 16, 0, 0).unwrap();
        let population = vec![
            merged("stale", MatchStatus::Live, 400, now),
            merged("done", MatchStatus::Finished, 10, now),
        ];
        let shape = QueryShape {
            statuses: Some(vec![MatchStatus::Finished]),
            ..QueryShape::default()
        };
        let gate_cfg = GateConfig::default();

        let (views, q) =
            apply_query(population.clone(), &shape, &gate_cfg, FilterStage::BeforeGate, now);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].record.id, "done");
        assert_eq!(q.total_before_filter, 1);
        assert_eq!(q.dropped_stale, 0);
        assert_eq!(q.total_after_filter, 1);

        let (views, q) = apply_query(population, &shape, &gate_cfg, FilterStage::AfterGate, now);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].record.id, "done");
        assert_eq!(q.total_before_filter, 2);
        assert_eq!(q.dropped_stale, 1);
        assert_eq!(q.dropped_total, 1);
        assert_eq!(q.total_after_filter, 1);
    }

    #[test]
    fn filter_echo_names() {
        let e = echo(&QueryShape::default(), FilterStage::BeforeGate);
        assert_eq!(e.status, "live");
        assert_eq!(e.source, "all");
        assert_eq!(e.stage, "before_gate");
    }
}
