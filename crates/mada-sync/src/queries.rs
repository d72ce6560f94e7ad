//! Read-side views over the store, in league-local time.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use mada_core::{Category, Side};
use mada_storage::{
    ChangeLogEntry, LocationId, MatchDate, MatchDateId, MatchResult, StoreData, StoreError,
    TeamId,
};
use serde::Serialize;

use crate::clashes::local_midnight;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchView {
    pub id: MatchDateId,
    pub url: String,
    pub kickoff: DateTime<FixedOffset>,
    pub home_team: String,
    pub away_team: String,
    pub location: Option<String>,
}

impl MatchView {
    pub fn build(store: &StoreData, tz: &Tz, row: &MatchDate) -> Result<Self, StoreError> {
        let location = row
            .location
            .map(|id| store.location(id).map(|l| l.name.clone()))
            .transpose()?;
        Ok(Self {
            id: row.id,
            url: row.url.clone(),
            kickoff: row.date_time.with_timezone(tz).fixed_offset(),
            home_team: store.team(row.home_team)?.name.clone(),
            away_team: store.team(row.away_team)?.name.clone(),
            location,
        })
    }
}

fn views_between(
    store: &StoreData,
    tz: &Tz,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<MatchView>, StoreError> {
    let mut rows: Vec<_> = store
        .match_dates()
        .iter()
        .filter(|m| from <= m.date_time && m.date_time < until)
        .collect();
    rows.sort_by_key(|m| (m.date_time, m.id));
    rows.into_iter()
        .map(|m| MatchView::build(store, tz, m))
        .collect()
}

/// Matches kicking off in `[from, from + days)`.
pub fn upcoming(
    store: &StoreData,
    tz: &Tz,
    from: DateTime<Utc>,
    days: i64,
) -> Result<Vec<MatchView>, StoreError> {
    views_between(store, tz, from, from + Duration::days(days.max(0)))
}

/// Matches on the local days `day - plusminus ..= day + plusminus`.
pub fn around_day(
    store: &StoreData,
    tz: &Tz,
    day: NaiveDate,
    plusminus: i64,
) -> Result<Vec<MatchView>, StoreError> {
    let span = Duration::days(plusminus.max(0));
    let first = day - span;
    let after_last = day + span + Duration::days(1);
    views_between(
        store,
        tz,
        local_midnight(tz, first),
        local_midnight(tz, after_last),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchHistory {
    pub current: MatchDate,
    /// Archived slots, oldest first.
    pub changes: Vec<ChangeLogEntry>,
}

pub fn match_history(store: &StoreData, id: MatchDateId) -> Result<MatchHistory, StoreError> {
    Ok(MatchHistory {
        current: store.match_date(id)?.clone(),
        changes: store.changelog(id).into_iter().cloned().collect(),
    })
}

pub fn team_matches(store: &StoreData, tz: &Tz, team: TeamId) -> Result<Vec<MatchView>, StoreError> {
    store.team(team)?;
    let mut rows = store.match_dates_of_team(team);
    rows.sort_by_key(|m| (m.date_time, m.id));
    rows.into_iter()
        .map(|m| MatchView::build(store, tz, m))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsualTime {
    pub weekday: Weekday,
    pub time: NaiveTime,
    pub matches: usize,
}

/// Kickoff slots seen at a venue, most frequent first.
pub fn usual_match_times(
    store: &StoreData,
    tz: &Tz,
    location: LocationId,
) -> Result<Vec<UsualTime>, StoreError> {
    store.location(location)?;
    let mut histogram: BTreeMap<(u32, NaiveTime), (Weekday, usize)> = BTreeMap::new();
    for m in store.match_dates_at(location) {
        let local = m.date_time.with_timezone(tz);
        let weekday = local.weekday();
        let entry = histogram
            .entry((weekday.num_days_from_monday(), local.time()))
            .or_insert((weekday, 0));
        entry.1 += 1;
    }
    let mut out: Vec<_> = histogram
        .into_iter()
        .map(|((_, time), (weekday, matches))| UsualTime {
            weekday,
            time,
            matches,
        })
        .collect();
    out.sort_by(|a, b| b.matches.cmp(&a.matches));
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryRow {
    pub category: Category,
    pub home: Vec<String>,
    pub away: Vec<String>,
    pub points: String,
    pub winner: Side,
    pub walkover: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResultView {
    pub result: MatchResult,
    /// One row per played category, HE1 through MX2.
    pub rows: Vec<CategoryRow>,
}

/// `None` when no result has been merged for the match yet.
pub fn match_result_view(
    store: &StoreData,
    id: MatchDateId,
) -> Result<Option<MatchResultView>, StoreError> {
    store.match_date(id)?;
    let Some(result_id) = store.find_match_result(id) else {
        return Ok(None);
    };

    let player_names = |side: Option<mada_storage::PlayerId>| -> Result<Vec<String>, StoreError> {
        side.map(|p| store.player(p).map(|p| vec![p.name.clone()]))
            .transpose()
            .map(Option::unwrap_or_default)
    };
    let pair_names = |side: Option<mada_storage::PairId>| -> Result<Vec<String>, StoreError> {
        let Some(pair) = side else {
            return Ok(Vec::new());
        };
        let (first, second) = store.pair(pair)?.players;
        Ok(vec![
            store.player(first)?.name.clone(),
            store.player(second)?.name.clone(),
        ])
    };

    let mut rows = Vec::new();
    for r in store.singles_results_of(id) {
        rows.push(CategoryRow {
            category: r.category,
            home: player_names(r.home.map(|s| s.participant))?,
            away: player_names(r.away.map(|s| s.participant))?,
            points: r.points_display(),
            winner: r.winner(),
            walkover: r.is_walkover(),
        });
    }
    for r in store.doubles_results_of(id) {
        rows.push(CategoryRow {
            category: r.category,
            home: pair_names(r.home.map(|s| s.participant))?,
            away: pair_names(r.away.map(|s| s.participant))?,
            points: r.points_display(),
            winner: r.winner(),
            walkover: r.is_walkover(),
        });
    }
    rows.sort_by_key(|row| row.category);

    Ok(Some(MatchResultView {
        result: store.match_result(result_id)?.clone(),
        rows,
    }))
}
