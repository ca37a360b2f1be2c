// src/merge.rs
//! Merger: collapses a `MatchGroup` into one `Match`.
//!
//! Each field has its own small selection function. Everything is a pure function of the
//! group contents, so the same group always yields the same `Match`.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::model::{
    Match, MatchGroup, MatchStatus, Observation, SourceId, TeamPairKey, Verification,
};
use crate::resolve::canonical_cmp;

/// Most recent first; ties go to the earlier source in `SourceId` order.
fn recency_cmp(a: &Observation, b: &Observation) -> Ordering {
    b.observed_at
        .cmp(&a.observed_at)
        .then_with(|| a.source_id.cmp(&b.source_id))
        .then_with(|| canonical_cmp(a, b))
}

fn by_recency(group: &MatchGroup) -> Vec<&Observation> {
    let mut v: Vec<&Observation> = group.observations.iter().collect();
    v.sort_by(|a, b| recency_cmp(a, b));
    v
}

/// Highest-priority status among the members.
pub fn select_status(observations: &[&Observation]) -> MatchStatus {
    observations
        .iter()
        .map(|o| o.status)
        .max_by_key(|s| s.priority())
        .unwrap_or(MatchStatus::Unknown)
}

/// First value in recency order for which `pick` returns something.
fn most_recent<'a, T>(
    recent: &[&'a Observation],
    pick: impl Fn(&'a Observation) -> Option<T>,
) -> Option<T> {
    recent.iter().find_map(|o| pick(o))
}

/// Score in the orientation of `reference` (home team of the display record first).
fn oriented_score(obs: &Observation, reference: &Observation) -> Option<(u32, u32)> {
    let (h, a) = obs.score()?;
    if obs.home_team == reference.home_team {
        Some((h, a))
    } else {
        Some((a, h))
    }
}

struct ScoreSelection {
    score: Option<(u32, u32)>,
    has_conflict: bool,
    discrepancies: Vec<String>,
    confirming_sources: usize,
}

/// Conflict = two observations at the same status reporting different scores.
fn select_score(
    recent: &[&Observation],
    reference: &Observation,
    status: MatchStatus,
) -> ScoreSelection {
    let scored: Vec<(&Observation, (u32, u32))> = recent
        .iter()
        .filter_map(|o| oriented_score(o, reference).map(|s| (*o, s)))
        .collect();

    let mut by_status: BTreeMap<&'static str, Vec<(SourceId, (u32, u32))>> = BTreeMap::new();
    for (o, s) in &scored {
        by_status.entry(o.status.as_str()).or_default().push((o.source_id, *s));
    }

    let mut discrepancies = Vec::new();
    for (status_name, reports) in by_status.iter_mut() {
        let distinct: BTreeSet<(u32, u32)> = reports.iter().map(|(_, s)| *s).collect();
        if distinct.len() > 1 {
            reports.sort();
            let mut line = format!("{status_name} score disagreement:");
            for (i, (src, (h, a))) in reports.iter().enumerate() {
                let sep = if i == 0 { " " } else { ", " };
                let _ = write!(line, "{sep}{src} {h}-{a}");
            }
            discrepancies.push(line);
        }
    }

    let at_status: Vec<&(&Observation, (u32, u32))> =
        scored.iter().filter(|(o, _)| o.status == status).collect();
    let chosen = match at_status.first() {
        Some((_, s)) => Some(*s),
        None => scored.first().map(|(_, s)| *s),
    };

    let confirming_sources = match chosen {
        Some(c) => scored
            .iter()
            .filter(|(_, s)| *s == c)
            .map(|(o, _)| o.source_id)
            .collect::<BTreeSet<_>>()
            .len(),
        None => 0,
    };

    ScoreSelection {
        score: chosen,
        has_conflict: !discrepancies.is_empty(),
        discrepancies,
        confirming_sources,
    }
}

/// Stable id from the team pair, competition and kickoff rounded to the nearest hour. The
/// same real match keeps its id across polling cycles even as sources come and go.
pub fn match_id(
    key: &TeamPairKey,
    competition: Option<&str>,
    kickoff: Option<DateTime<Utc>>,
) -> String {
    let kickoff_part = kickoff
        .map(|k| {
            k.checked_add_signed(Duration::minutes(30))
                .unwrap_or(k)
                .format("%Y-%m-%dT%H")
                .to_string()
        })
        .unwrap_or_else(|| "undated".to_string());
    let material = format!(
        "{}|{}|{}|{}",
        key.first,
        key.second,
        competition.unwrap_or(""),
        kickoff_part
    );

    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(18);
    out.push_str("m_");
    for b in digest.iter().take(8) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn single_source_confidence(source: SourceId) -> f64 {
    match source {
        SourceId::Goal => 0.72,
        SourceId::Espn => 0.68,
        SourceId::Sofascore => 0.74,
        SourceId::Streamed => 0.40,
    }
}

/// Trust in the displayed score, derived only from how the sources back it up.
pub fn confidence(
    verification: Verification,
    sources: &BTreeSet<SourceId>,
    confirming_sources: usize,
    has_score: bool,
) -> f64 {
    match verification {
        Verification::ScoreConflict => 0.50,
        Verification::SingleSource => sources
            .iter()
            .next()
            .map(|s| single_source_confidence(*s))
            .unwrap_or(0.0),
        Verification::Confirmed if confirming_sources >= 3 => 0.98,
        Verification::Confirmed => 0.95,
        Verification::Unconfirmed if has_score => 0.83,
        Verification::Unconfirmed => 0.80,
    }
}

/// Merge one group into a canonical match.
pub fn merge(group: &MatchGroup) -> Match {
    let recent = by_recency(group);
    let Some(reference) = recent.first().copied() else {
        return empty_match(&group.key);
    };

    let status = select_status(&recent);
    let scores = select_score(&recent, reference, status);

    let sources: BTreeSet<SourceId> = recent.iter().map(|o| o.source_id).collect();

    let mut external_ids = BTreeMap::new();
    for o in &recent {
        if let Some(id) = &o.provider_match_id {
            external_ids.entry(o.source_id).or_insert_with(|| id.clone());
        }
    }

    let home_team = if reference.home_display.is_empty() {
        reference.home_team.clone()
    } else {
        reference.home_display.clone()
    };
    let away_team = if reference.away_display.is_empty() {
        reference.away_team.clone()
    } else {
        reference.away_display.clone()
    };

    let competition = most_recent(&recent, |o| o.competition_display.clone());
    let kickoff_time = most_recent(&recent, |o| o.kickoff_time);
    let venue = most_recent(&recent, |o| o.venue.clone());
    let watch_link = most_recent(&recent, |o| match o.source_id {
        SourceId::Streamed => o.watch_link.clone(),
        _ => None,
    });
    // Minute and stoppage time come from the same report.
    let (minute, extra_minute) = if status == MatchStatus::Live {
        most_recent(&recent, |o| match (o.status, o.minute) {
            (MatchStatus::Live, Some(m)) => Some((Some(m), o.extra_minute)),
            _ => None,
        })
        .unwrap_or((None, None))
    } else {
        (None, None)
    };

    let last_updated = group
        .observations
        .iter()
        .map(|o| o.observed_at)
        .max()
        .unwrap_or(reference.observed_at);

    // Identity uses order-free inputs so it does not flip with recency.
    let id_competition = group
        .observations
        .iter()
        .map(|o| o.competition.as_str())
        .filter(|c| !c.is_empty())
        .min();
    let id_kickoff = group.observations.iter().filter_map(|o| o.kickoff_time).min();
    let id = match_id(&group.key, id_competition, id_kickoff);

    let verification = if scores.has_conflict {
        Verification::ScoreConflict
    } else if sources.len() == 1 {
        Verification::SingleSource
    } else if scores.confirming_sources >= 2 {
        Verification::Confirmed
    } else {
        Verification::Unconfirmed
    };

    let confidence = confidence(
        verification,
        &sources,
        scores.confirming_sources,
        scores.score.is_some(),
    );

    let (home_score, away_score) = match scores.score {
        Some((h, a)) => (Some(h), Some(a)),
        None => (None, None),
    };

    Match {
        id,
        home_team,
        away_team,
        competition,
        kickoff_time,
        status,
        home_score,
        away_score,
        sources,
        last_updated,
        has_conflict: scores.has_conflict,
        watch_link,
        verification,
        discrepancies: scores.discrepancies,
        external_ids,
        minute,
        extra_minute,
        venue,
        confidence,
    }
}

/// Degenerate result for a group with no members.
fn empty_match(key: &TeamPairKey) -> Match {
    Match {
        id: match_id(key, None, None),
        home_team: key.first.clone(),
        away_team: key.second.clone(),
        competition: None,
        kickoff_time: None,
        status: MatchStatus::Unknown,
        home_score: None,
        away_score: None,
        sources: BTreeSet::new(),
        last_updated: DateTime::<Utc>::MIN_UTC,
        has_conflict: false,
        watch_link: None,
        verification: Verification::SingleSource,
        discrepancies: Vec::new(),
        external_ids: BTreeMap::new(),
        minute: None,
        extra_minute: None,
        venue: None,
        confidence: 0.0,
    }
}

/// Merge every group.
pub fn merge_all(groups: &[MatchGroup]) -> Vec<Match> {
    groups.iter().map(merge).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 12, 15, 0, 0).unwrap()
    }

    fn live(src: SourceId, score: Option<(u32, u32)>, age_secs: i64) -> Observation {
        Observation {
            source_id: src,
            provider_match_id: Some(format!("{src}-1")),
            home_team: "alpha".into(),
            away_team: "beta".into(),
            home_display: "Alpha FC".into(),
            away_display: "Beta".into(),
            competition: "cup".into(),
            competition_display: Some("Cup".into()),
            kickoff_time: Some(base()),
            status: MatchStatus::Live,
            home_score: score.map(|s| s.0),
            away_score: score.map(|s| s.1),
            observed_at: base() + Duration::minutes(60) - Duration::seconds(age_secs),
            watch_link: None,
            minute: Some(55),
            extra_minute: None,
            venue: None,
        }
    }

    fn group(obs: Vec<Observation>) -> MatchGroup {
        MatchGroup {
            key: TeamPairKey::new("alpha", "beta"),
            observations: obs,
        }
    }

    #[test]
    fn live_beats_stale_scheduled() {
        let mut sched = live(SourceId::Goal, None, 0);
        sched.status = MatchStatus::Scheduled;
        let m = merge(&group(vec![sched, live(SourceId::Espn, Some((0, 0)), 300)]));
        assert_eq!(m.status, MatchStatus::Live);
        assert_eq!((m.home_score, m.away_score), (Some(0), Some(0)));
    }

    #[test]
    fn disagreement_at_same_status_is_conflict() {
        let m = merge(&group(vec![
            live(SourceId::Goal, Some((1, 0)), 30),
            live(SourceId::Espn, Some((2, 0)), 10),
        ]));
        assert!(m.has_conflict);
        assert_eq!(m.verification, Verification::ScoreConflict);
        assert_eq!(m.home_score, Some(2), "most recent wins provisionally");
        assert_eq!(
            m.discrepancies,
            vec!["live score disagreement: goal 1-0, espn 2-0".to_string()]
        );
    }

    #[test]
    fn agreement_is_confirmed() {
        let m = merge(&group(vec![
            live(SourceId::Goal, Some((1, 1)), 30),
            live(SourceId::Espn, Some((1, 1)), 10),
        ]));
        assert!(!m.has_conflict);
        assert_eq!(m.verification, Verification::Confirmed);
    }

    #[test]
    fn different_statuses_do_not_conflict() {
        let mut done = live(SourceId::Goal, Some((2, 1)), 5);
        done.status = MatchStatus::Finished;
        let m = merge(&group(vec![done, live(SourceId::Espn, Some((1, 1)), 200)]));
        assert!(!m.has_conflict);
        assert_eq!(m.status, MatchStatus::Live);
        assert_eq!(m.home_score, Some(1), "score at the merged status is preferred");
    }

    #[test]
    fn swapped_orientation_scores_are_aligned() {
        let mut swapped = live(SourceId::Espn, Some((0, 2)), 60);
        swapped.home_team = "beta".into();
        swapped.away_team = "alpha".into();
        swapped.home_display = "Beta".into();
        swapped.away_display = "Alpha".into();
        let m = merge(&group(vec![live(SourceId::Goal, Some((2, 0)), 10), swapped]));
        assert!(!m.has_conflict);
        assert_eq!(m.home_team, "Alpha FC");
        assert_eq!((m.home_score, m.away_score), (Some(2), Some(0)));
    }

    #[test]
    fn display_fields_follow_most_recent_with_value() {
        let mut older = live(SourceId::Goal, Some((0, 0)), 100);
        older.kickoff_time = Some(base() - Duration::minutes(5));
        older.venue = Some("Alpha Park".into());
        let mut newer = live(SourceId::Sofascore, Some((0, 0)), 1);
        newer.competition_display = Some("The Cup".into());
        newer.venue = None;

        let m = merge(&group(vec![older, newer]));
        assert_eq!(m.competition.as_deref(), Some("The Cup"));
        assert_eq!(m.kickoff_time, Some(base()));
        assert_eq!(m.venue.as_deref(), Some("Alpha Park"));
        assert_eq!(m.last_updated, base() + Duration::minutes(60) - Duration::seconds(1));
    }

    #[test]
    fn merge_is_deterministic_and_order_free() {
        let a = live(SourceId::Goal, Some((1, 0)), 20);
        let b = live(SourceId::Espn, Some((1, 0)), 20);
        let mut c = live(SourceId::Streamed, None, 40);
        c.status = MatchStatus::Unknown;
        c.watch_link = Some("https://streamed.pk/watch/ab".into());

        let m1 = merge(&group(vec![a.clone(), b.clone(), c.clone()]));
        let m2 = merge(&group(vec![c, b, a]));
        assert_eq!(m1, m2);
        assert_eq!(
            serde_json::to_string(&m1).unwrap(),
            serde_json::to_string(&m2).unwrap()
        );
        assert_eq!(m1.watch_link.as_deref(), Some("https://streamed.pk/watch/ab"));
        assert_eq!(m1.sources.len(), 3);
    }

    #[test]
    fn id_ignores_kickoff_minutes_but_not_day() {
        let key = TeamPairKey::new("alpha", "beta");
        let a = match_id(&key, Some("cup"), Some(base()));
        let b = match_id(&key, Some("cup"), Some(base() + Duration::minutes(10)));
        let c = match_id(&key, Some("cup"), Some(base() + Duration::days(7)));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("m_") && a.len() == 18);
    }

    #[test]
    fn id_survives_a_source_dropping_out() {
        let mut early = live(SourceId::Goal, Some((0, 0)), 10);
        early.kickoff_time = Some(base() - Duration::minutes(5));
        let on_time = live(SourceId::Espn, Some((0, 0)), 20);

        let both = merge(&group(vec![early.clone(), on_time.clone()]));
        let without_early = merge(&group(vec![on_time]));
        let without_on_time = merge(&group(vec![early]));
        assert_eq!(both.id, without_early.id);
        assert_eq!(both.id, without_on_time.id);
    }

    #[test]
    fn stoppage_time_travels_with_the_minute() {
        let mut newer = live(SourceId::Espn, Some((1, 0)), 5);
        newer.minute = Some(90);
        newer.extra_minute = Some(3);
        let m = merge(&group(vec![live(SourceId::Goal, Some((1, 0)), 60), newer]));
        assert_eq!((m.minute, m.extra_minute), (Some(90), Some(3)));

        let mut done = live(SourceId::Espn, Some((1, 0)), 5);
        done.status = MatchStatus::Finished;
        done.extra_minute = Some(4);
        let m = merge(&group(vec![done]));
        assert_eq!((m.minute, m.extra_minute), (None, None));
    }

    #[test]
    fn confidence_follows_verification() {
        let single = merge(&group(vec![live(SourceId::Sofascore, Some((1, 0)), 5)]));
        assert_eq!(single.confidence, 0.74);

        let confirmed = merge(&group(vec![
            live(SourceId::Goal, Some((1, 1)), 30),
            live(SourceId::Espn, Some((1, 1)), 10),
        ]));
        assert_eq!(confirmed.confidence, 0.95);

        let three = merge(&group(vec![
            live(SourceId::Goal, Some((1, 1)), 30),
            live(SourceId::Espn, Some((1, 1)), 10),
            live(SourceId::Sofascore, Some((1, 1)), 20),
        ]));
        assert_eq!(three.confidence, 0.98);

        let conflict = merge(&group(vec![
            live(SourceId::Goal, Some((1, 0)), 30),
            live(SourceId::Espn, Some((2, 0)), 10),
        ]));
        assert_eq!(conflict.confidence, 0.50);

        let mut link = live(SourceId::Streamed, None, 40);
        link.status = MatchStatus::Unknown;
        let unconfirmed = merge(&group(vec![live(SourceId::Goal, Some((0, 0)), 5), link]));
        assert_eq!(unconfirmed.verification, Verification::Unconfirmed);
        assert_eq!(unconfirmed.confidence, 0.83);
    }

    #[test]
    fn empty_group_does_not_panic() {
        let m = merge(&group(vec![]));
        assert_eq!(m.status, MatchStatus::Unknown);
        assert!(m.sources.is_empty());
    }
}
