// src/resolve.rs
//! Identity resolver: groups observations from different sources that denote the same
//! real match.
//!
//! Primary key is the unordered normalized team pair. Within a pair, kickoff times are
//! clustered from the earliest one: a kickoff more than `kickoff_tolerance` after the
//! cluster's first kickoff opens a new cluster. Observations without a kickoff join the
//! first cluster of their pair, preferring one whose competition matches.
//!
//! Output is canonical (pair key, then earliest kickoff; members in a fixed order), so
//! resolution does not depend on the order sources answered in.

use chrono::Duration;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use strsim::jaro_winkler;

use crate::model::{MatchGroup, Observation, TeamPairKey};

pub const DEFAULT_KICKOFF_TOLERANCE_MINUTES: i64 = 120;

/// Similarity above which two different team keys are reported as a likely alias gap.
pub const NEAR_MISS_SIMILARITY: f64 = 0.92;

#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    pub kickoff_tolerance: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            kickoff_tolerance: Duration::minutes(DEFAULT_KICKOFF_TOLERANCE_MINUTES),
        }
    }
}

/// Total order over observations used for canonical member ordering.
pub(crate) fn canonical_cmp(a: &Observation, b: &Observation) -> Ordering {
    a.kickoff_time
        .is_none()
        .cmp(&b.kickoff_time.is_none())
        .then_with(|| a.kickoff_time.cmp(&b.kickoff_time))
        .then_with(|| a.source_id.cmp(&b.source_id))
        .then_with(|| a.provider_match_id.cmp(&b.provider_match_id))
        .then_with(|| a.observed_at.cmp(&b.observed_at))
        .then_with(|| a.home_team.cmp(&b.home_team))
        .then_with(|| a.away_team.cmp(&b.away_team))
        .then_with(|| a.competition.cmp(&b.competition))
        .then_with(|| b.status.priority().cmp(&a.status.priority()))
        .then_with(|| a.home_score.cmp(&b.home_score))
        .then_with(|| a.away_score.cmp(&b.away_score))
        .then_with(|| a.home_display.cmp(&b.home_display))
        .then_with(|| a.away_display.cmp(&b.away_display))
        .then_with(|| a.competition_display.cmp(&b.competition_display))
        .then_with(|| a.watch_link.cmp(&b.watch_link))
        .then_with(|| a.minute.cmp(&b.minute))
        .then_with(|| a.venue.cmp(&b.venue))
}

/// Group observations into matches.
pub fn resolve(observations: Vec<Observation>, cfg: &ResolverConfig) -> Vec<MatchGroup> {
    let mut by_pair: BTreeMap<TeamPairKey, Vec<Observation>> = BTreeMap::new();
    for obs in observations {
        if obs.home_team.is_empty() || obs.away_team.is_empty() {
            tracing::debug!(
                target: "resolve",
                source = %obs.source_id,
                home = %obs.home_display,
                away = %obs.away_display,
                "skipping observation without both team names"
            );
            continue;
        }
        by_pair.entry(TeamPairKey::of(&obs)).or_default().push(obs);
    }

    let mut groups = Vec::with_capacity(by_pair.len());
    for (key, mut members) in by_pair {
        members.sort_by(canonical_cmp);
        for cluster in cluster_pair(members, cfg.kickoff_tolerance) {
            groups.push(MatchGroup {
                key: key.clone(),
                observations: cluster,
            });
        }
    }
    groups
}

/// Split one pair's observations (already canonically sorted) into kickoff clusters.
fn cluster_pair(members: Vec<Observation>, tolerance: Duration) -> Vec<Vec<Observation>> {
    let (timed, untimed): (Vec<_>, Vec<_>) =
        members.into_iter().partition(|o| o.kickoff_time.is_some());

    let mut clusters: Vec<Vec<Observation>> = Vec::new();
    let mut anchor = None;
    for obs in timed {
        let kickoff = obs.kickoff_time;
        match (anchor, kickoff) {
            (Some(a), Some(k)) if k - a <= tolerance => {
                if let Some(last) = clusters.last_mut() {
                    last.push(obs);
                }
            }
            _ => {
                anchor = kickoff;
                clusters.push(vec![obs]);
            }
        }
    }

    if clusters.is_empty() {
        if !untimed.is_empty() {
            clusters.push(untimed);
        }
        return clusters;
    }

    for obs in untimed {
        let idx = if obs.competition.is_empty() {
            0
        } else {
            clusters
                .iter()
                .position(|c| c.iter().any(|m| m.competition == obs.competition))
                .unwrap_or(0)
        };
        clusters[idx].push(obs);
    }

    // Timeless members were appended; restore canonical member order.
    for c in clusters.iter_mut() {
        c.sort_by(canonical_cmp);
    }
    clusters
}

/// Pairs of groups whose team keys are nearly but not exactly equal. Grouping never
/// merges these; they are candidates for new alias table entries.
pub fn near_miss_pairs(groups: &[MatchGroup]) -> Vec<(TeamPairKey, TeamPairKey, f64)> {
    let mut keys: Vec<&TeamPairKey> = groups.iter().map(|g| &g.key).collect();
    keys.dedup();

    let mut out = Vec::new();
    for (i, a) in keys.iter().enumerate() {
        for b in keys.iter().skip(i + 1) {
            let direct = (jaro_winkler(&a.first, &b.first) + jaro_winkler(&a.second, &b.second)) / 2.0;
            let crossed =
                (jaro_winkler(&a.first, &b.second) + jaro_winkler(&a.second, &b.first)) / 2.0;
            let sim = direct.max(crossed);
            if sim >= NEAR_MISS_SIMILARITY {
                out.push(((*a).clone(), (*b).clone(), sim));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchStatus, SourceId};
    use chrono::{DateTime, TimeZone, Utc};

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 12, h, m, 0).unwrap()
    }

    fn obs(src: SourceId, home: &str, away: &str, kickoff: Option<DateTime<Utc>>) -> Observation {
        Observation {
            source_id: src,
            provider_match_id: None,
            home_team: home.into(),
            away_team: away.into(),
            home_display: home.into(),
            away_display: away.into(),
            competition: String::new(),
            competition_display: None,
            kickoff_time: kickoff,
            status: MatchStatus::Scheduled,
            home_score: None,
            away_score: None,
            observed_at: t(12, 0),
            watch_link: None,
            minute: None,
            extra_minute: None,
            venue: None,
        }
    }

    #[test]
    fn swapped_orientation_joins_same_group() {
        let groups = resolve(
            vec![
                obs(SourceId::Goal, "alpha", "beta", Some(t(15, 0))),
                obs(SourceId::Espn, "beta", "alpha", Some(t(15, 5))),
            ],
            &ResolverConfig::default(),
        );
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].observations.len(), 2);
    }

    #[test]
    fn kickoffs_beyond_tolerance_split() {
        let groups = resolve(
            vec![
                obs(SourceId::Goal, "alpha", "beta", Some(t(12, 0))),
                obs(SourceId::Espn, "alpha", "beta", Some(t(14, 0))),
                obs(SourceId::Sofascore, "alpha", "beta", Some(t(14, 1))),
            ],
            &ResolverConfig::default(),
        );
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].observations.len(), 2, "exactly 2h apart stays together");
        assert_eq!(groups[1].observations[0].source_id, SourceId::Sofascore);
    }

    #[test]
    fn timeless_observations_join_first_cluster() {
        let groups = resolve(
            vec![
                obs(SourceId::Goal, "alpha", "beta", Some(t(20, 0))),
                obs(SourceId::Espn, "alpha", "beta", Some(t(9, 0))),
                obs(SourceId::Streamed, "alpha", "beta", None),
            ],
            &ResolverConfig::default(),
        );
        assert_eq!(groups.len(), 2);
        let first = &groups[0];
        assert_eq!(first.observations[0].kickoff_time, Some(t(9, 0)));
        assert!(first
            .observations
            .iter()
            .any(|o| o.source_id == SourceId::Streamed));
    }

    #[test]
    fn timeless_observation_prefers_matching_competition() {
        let mut early = obs(SourceId::Goal, "alpha", "beta", Some(t(9, 0)));
        early.competition = "league".into();
        let mut late = obs(SourceId::Espn, "alpha", "beta", Some(t(20, 0)));
        late.competition = "cup".into();
        let mut floating = obs(SourceId::Sofascore, "alpha", "beta", None);
        floating.competition = "cup".into();

        let groups = resolve(vec![early, late, floating], &ResolverConfig::default());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].observations.len(), 1);
        assert_eq!(groups[1].observations.len(), 2);
    }

    #[test]
    fn single_source_pair_is_a_singleton_group() {
        let groups = resolve(
            vec![obs(SourceId::Goal, "alpha", "beta", None)],
            &ResolverConfig::default(),
        );
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].observations.len(), 1);
    }

    #[test]
    fn nameless_observations_are_skipped() {
        let groups = resolve(
            vec![obs(SourceId::Streamed, "", "beta", None)],
            &ResolverConfig::default(),
        );
        assert!(groups.is_empty());
    }

    #[test]
    fn regrouping_a_group_is_idempotent() {
        let groups = resolve(
            vec![
                obs(SourceId::Goal, "alpha", "beta", Some(t(15, 0))),
                obs(SourceId::Espn, "beta", "alpha", Some(t(16, 30))),
                obs(SourceId::Streamed, "alpha", "beta", None),
            ],
            &ResolverConfig::default(),
        );
        assert_eq!(groups.len(), 1);
        let again = resolve(groups[0].observations.clone(), &ResolverConfig::default());
        assert_eq!(again, groups);
    }

    #[test]
    fn near_misses_are_reported_not_merged() {
        let groups = resolve(
            vec![
                obs(SourceId::Goal, "manchester united", "liverpool", None),
                obs(SourceId::Espn, "manchester utd", "liverpool", None),
                obs(SourceId::Espn, "arsenal", "chelsea", None),
            ],
            &ResolverConfig::default(),
        );
        assert_eq!(groups.len(), 3);
        let misses = near_miss_pairs(&groups);
        assert_eq!(misses.len(), 1);
        assert!(misses[0].2 >= NEAR_MISS_SIMILARITY);
    }
}
