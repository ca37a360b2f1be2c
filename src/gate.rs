// src/gate.rs
//! Quality gate: drops live matches that have not been updated recently and matches whose
//! sources disagree on the score.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Match, MatchStatus, QualityReport};

pub const DEFAULT_MAX_LIVE_STALE_SECONDS: u64 = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct GateConfig {
    pub max_live_stale_seconds: u64,
    pub include_stale: bool,
    pub include_conflicts: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_live_stale_seconds: DEFAULT_MAX_LIVE_STALE_SECONDS,
            include_stale: false,
            include_conflicts: false,
        }
    }
}

/// Seconds since the match was last updated; never negative.
pub fn update_age_seconds(m: &Match, now: DateTime<Utc>) -> u64 {
    (now - m.last_updated).num_seconds().max(0) as u64
}

/// Strict comparison: a match exactly `max_live_stale_seconds` old is still fresh.
pub fn is_stale(m: &Match, now: DateTime<Utc>, max_live_stale_seconds: u64) -> bool {
    m.status == MatchStatus::Live && update_age_seconds(m, now) > max_live_stale_seconds
}

/// Apply both rules. Counters are computed over the whole input, and kept matches keep
/// their input order.
pub fn gate(matches: Vec<Match>, now: DateTime<Utc>, cfg: &GateConfig) -> (Vec<Match>, QualityReport) {
    let mut report = QualityReport {
        total_before_filter: matches.len(),
        max_live_stale_seconds: cfg.max_live_stale_seconds,
        include_stale: cfg.include_stale,
        include_conflicts: cfg.include_conflicts,
        ..QualityReport::default()
    };

    let mut kept = Vec::with_capacity(matches.len());
    for m in matches {
        let drop_stale = !cfg.include_stale && is_stale(&m, now, cfg.max_live_stale_seconds);
        let drop_conflict = !cfg.include_conflicts && m.has_conflict;

        if drop_stale {
            report.dropped_stale += 1;
        }
        if drop_conflict {
            report.dropped_conflict += 1;
        }
        if drop_stale || drop_conflict {
            report.dropped_total += 1;
            tracing::debug!(
                target: "gate",
                id = %m.id,
                stale = drop_stale,
                conflict = drop_conflict,
                "match dropped"
            );
            continue;
        }
        kept.push(m);
    }

    report.total_after_filter = kept.len();
    debug_assert_eq!(
        report.total_before_filter,
        report.total_after_filter + report.dropped_total
    );
    (kept, report)
}
