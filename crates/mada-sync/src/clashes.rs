//! Conflict scanner: same-day matches of a team, ranked by how likely they are a real problem.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use mada_storage::{MatchDate, StoreData, StoreError, TeamId};
use serde::Serialize;

/// Any two kickoffs closer than this cannot both be played.
pub const UNPLAYABLE_GAP_SECS: i64 = 2 * 3600 + 15 * 60;
/// Minimum gap when the team also has to travel between venues.
pub const TRAVEL_GAP_SECS: i64 = 3 * 3600 + 45 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    ProbablyIntentional,
    Warning,
    Unplayable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClashResult {
    pub day: NaiveDate,
    pub team_name: String,
    pub matches: Vec<MatchDate>,
    pub severity: Severity,
}

/// Half-open UTC interval of one league season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeasonWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SeasonWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

pub(crate) fn local_midnight(tz: &Tz, day: NaiveDate) -> DateTime<Utc> {
    let naive = day.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

/// Classifies one same-day group from its pairwise kickoff gaps.
pub fn classify(matches: &[&MatchDate]) -> Severity {
    let mut min_gap = i64::MAX;
    for (idx, a) in matches.iter().enumerate() {
        for b in &matches[idx + 1..] {
            let gap = (a.date_time - b.date_time).num_seconds().abs();
            min_gap = min_gap.min(gap);
        }
    }
    let locations: BTreeSet<_> = matches.iter().map(|m| m.location).collect();

    if min_gap < UNPLAYABLE_GAP_SECS {
        Severity::Unplayable
    } else if locations.len() > 1 {
        if min_gap < TRAVEL_GAP_SECS {
            Severity::Unplayable
        } else {
            Severity::Warning
        }
    } else {
        Severity::ProbablyIntentional
    }
}

#[derive(Debug, Clone)]
pub struct ConflictScanner {
    tz: Tz,
}

impl ConflictScanner {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Season containing `today`: September 1 up to and including April 30, local time.
    pub fn season_window(&self, today: NaiveDate) -> SeasonWindow {
        let start_year = if today.month() >= 9 {
            today.year()
        } else {
            today.year() - 1
        };
        let start = NaiveDate::from_ymd_opt(start_year, 9, 1).unwrap_or(today);
        let end = NaiveDate::from_ymd_opt(start_year + 1, 5, 1).unwrap_or(today);
        SeasonWindow {
            start: local_midnight(&self.tz, start),
            end: local_midnight(&self.tz, end),
        }
    }

    pub fn scan_team(
        &self,
        store: &StoreData,
        team: TeamId,
        window: SeasonWindow,
    ) -> Result<Vec<ClashResult>, StoreError> {
        let team_name = store.team(team)?.name.clone();
        let mut by_day: BTreeMap<NaiveDate, Vec<&MatchDate>> = BTreeMap::new();
        for m in store.match_dates_of_team(team) {
            if window.contains(m.date_time) {
                let day = m.date_time.with_timezone(&self.tz).date_naive();
                by_day.entry(day).or_default().push(m);
            }
        }

        Ok(by_day
            .into_iter()
            .filter(|(_, matches)| matches.len() >= 2)
            .map(|(day, mut matches)| {
                matches.sort_by_key(|m| m.date_time);
                ClashResult {
                    day,
                    team_name: team_name.clone(),
                    severity: classify(&matches),
                    matches: matches.into_iter().cloned().collect(),
                }
            })
            .collect())
    }

    /// Clashes of every known team, most severe first, then by day.
    pub fn scan_all(
        &self,
        store: &StoreData,
        window: SeasonWindow,
    ) -> Result<Vec<ClashResult>, StoreError> {
        let mut out = Vec::new();
        for team in store.teams() {
            out.extend(self.scan_team(store, team.id, window)?);
        }
        out.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(a.day.cmp(&b.day))
                .then(a.team_name.cmp(&b.team_name))
        });
        Ok(out)
    }
}
