//! Snapshot model for league schedule and result observations.
//!
//! Everything here is an immutable value object describing one fetched
//! observation. Identity is by natural key only; surrogate ids live in
//! `mada-storage`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "mada-core";

/// Highest point count a single set may record.
pub const MAX_SET_POINTS: i32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("set {set}: {points} points is outside 0..={max}", max = MAX_SET_POINTS)]
    SetPointsOutOfRange { set: u8, points: i32 },
    #[error("set {set} recorded without the set before it")]
    SetOrder { set: u8 },
    #[error("{entity} has an empty natural key")]
    EmptyKey { entity: &'static str },
    #[error("malformed url `{url}`")]
    MalformedUrl { url: String },
    #[error("category {category} is not a {expected} category")]
    WrongDiscipline {
        category: Category,
        expected: &'static str,
    },
    #[error("doubles pair lists player {url} twice")]
    SamePlayerPair { url: String },
    #[error("{category}: {source}")]
    InCategory {
        category: Category,
        #[source]
        source: Box<ValidationError>,
    },
}

impl ValidationError {
    /// Tags an error with the category result it was found in.
    pub fn in_category(category: Category) -> impl FnOnce(ValidationError) -> ValidationError {
        move |source| ValidationError::InCategory {
            category,
            source: Box::new(source),
        }
    }
}

/// Closed set of team-match disciplines shared by snapshots, merging and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    He1,
    He2,
    He3,
    De1,
    Hd1,
    Hd2,
    Dd1,
    Mx1,
    Mx2,
}

impl Category {
    pub const fn all() -> [Category; 9] {
        [
            Category::He1,
            Category::He2,
            Category::He3,
            Category::De1,
            Category::Hd1,
            Category::Hd2,
            Category::Dd1,
            Category::Mx1,
            Category::Mx2,
        ]
    }

    pub const fn singles() -> [Category; 4] {
        [Category::He1, Category::He2, Category::He3, Category::De1]
    }

    pub const fn doubles() -> [Category; 5] {
        [
            Category::Hd1,
            Category::Hd2,
            Category::Dd1,
            Category::Mx1,
            Category::Mx2,
        ]
    }

    pub fn is_singles(self) -> bool {
        Self::singles().contains(&self)
    }

    pub fn is_doubles(self) -> bool {
        !self.is_singles()
    }

    pub fn code(self) -> &'static str {
        match self {
            Category::He1 => "he1",
            Category::He2 => "he2",
            Category::He3 => "he3",
            Category::De1 => "de1",
            Category::Hd1 => "hd1",
            Category::Hd2 => "hd2",
            Category::Dd1 => "dd1",
            Category::Mx1 => "mx1",
            Category::Mx2 => "mx2",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code().to_ascii_uppercase())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Category::all()
            .into_iter()
            .find(|c| c.code() == wanted)
            .ok_or_else(|| format!("unknown result category `{s}`"))
    }
}

/// Which side of a match an outcome refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
    #[default]
    Neither,
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub url: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draw {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Club {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    pub url: String,
    pub club: Club,
}

impl Team {
    /// Team number taken from the trailing token of the name ("Basel 2" -> 2).
    pub fn team_number(&self) -> u32 {
        team_number(&self.name)
    }
}

/// One observed schedule slot of an interclub match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchDate {
    pub url: String,
    pub date_time: DateTime<FixedOffset>,
    pub home_team: Team,
    pub away_team: Team,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub season: Option<Season>,
    #[serde(default)]
    pub draw: Option<Draw>,
}

impl MatchDate {
    pub fn date_time_utc(&self) -> DateTime<Utc> {
        self.date_time.with_timezone(&Utc)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        url_key("match date", &self.url)?;
        for team in [&self.home_team, &self.away_team] {
            non_empty("team", &team.name)?;
            non_empty("club", &team.club.name)?;
        }
        if let Some(location) = &self.location {
            non_empty("location", &location.name)?;
        }
        if let Some(season) = &self.season {
            url_key("season", &season.url)?;
        }
        if let Some(draw) = &self.draw {
            url_key("draw", &draw.url)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Set {
    pub home_points: i32,
    pub away_points: i32,
}

impl Set {
    pub fn new(home_points: i32, away_points: i32) -> Self {
        Self {
            home_points,
            away_points,
        }
    }

    pub fn validate(&self, set: u8) -> Result<(), ValidationError> {
        for points in [self.home_points, self.away_points] {
            if !(0..=MAX_SET_POINTS).contains(&points) {
                return Err(ValidationError::SetPointsOutOfRange { set, points });
            }
        }
        Ok(())
    }
}

/// Rejects out-of-range points and a later set recorded without the earlier one.
pub fn validate_sets(sets: [Option<&Set>; 3]) -> Result<(), ValidationError> {
    for (idx, set) in sets.iter().enumerate() {
        let number = idx as u8 + 1;
        if let Some(set) = set {
            set.validate(number)?;
            if idx > 0 && sets[idx - 1].is_none() {
                return Err(ValidationError::SetOrder { set: number });
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinglesResult {
    #[serde(default)]
    pub home_player: Option<Player>,
    #[serde(default)]
    pub away_player: Option<Player>,
    #[serde(default)]
    pub set_1: Option<Set>,
    #[serde(default)]
    pub set_2: Option<Set>,
    #[serde(default)]
    pub set_3: Option<Set>,
    #[serde(default)]
    pub winner: Side,
    #[serde(default)]
    pub retired: Side,
}

impl SinglesResult {
    pub fn sets(&self) -> [Option<&Set>; 3] {
        [self.set_1.as_ref(), self.set_2.as_ref(), self.set_3.as_ref()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoublesPair {
    pub first: Player,
    pub second: Player,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoublesResult {
    #[serde(default)]
    pub home_pair: Option<DoublesPair>,
    #[serde(default)]
    pub away_pair: Option<DoublesPair>,
    #[serde(default)]
    pub set_1: Option<Set>,
    #[serde(default)]
    pub set_2: Option<Set>,
    #[serde(default)]
    pub set_3: Option<Set>,
    #[serde(default)]
    pub winner: Side,
    #[serde(default)]
    pub retired: Side,
}

impl DoublesResult {
    pub fn sets(&self) -> [Option<&Set>; 3] {
        [self.set_1.as_ref(), self.set_2.as_ref(), self.set_3.as_ref()]
    }
}

/// All category results of one team match as published after the match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMatchResult {
    #[serde(default)]
    pub singles: BTreeMap<Category, SinglesResult>,
    #[serde(default)]
    pub doubles: BTreeMap<Category, DoublesResult>,
    #[serde(default)]
    pub winner: Side,
    pub url: String,
}

impl TeamMatchResult {
    pub fn event_count(&self) -> usize {
        self.singles.len() + self.doubles.len()
    }

    /// Checks the whole record so nothing is merged from a partially valid result.
    pub fn validate(&self) -> Result<(), ValidationError> {
        split_result_url(&self.url)?;
        for (category, result) in &self.singles {
            if !category.is_singles() {
                return Err(ValidationError::WrongDiscipline {
                    category: *category,
                    expected: "singles",
                });
            }
            let tag = || ValidationError::in_category(*category);
            for player in [&result.home_player, &result.away_player].into_iter().flatten() {
                url_key("player", &player.url).map_err(tag())?;
            }
            validate_sets(result.sets()).map_err(tag())?;
        }
        for (category, result) in &self.doubles {
            if !category.is_doubles() {
                return Err(ValidationError::WrongDiscipline {
                    category: *category,
                    expected: "doubles",
                });
            }
            let tag = || ValidationError::in_category(*category);
            for pair in [&result.home_pair, &result.away_pair].into_iter().flatten() {
                let first = url_key("player", &pair.first.url).map_err(tag())?;
                let second = url_key("player", &pair.second.url).map_err(tag())?;
                if first == second {
                    return Err(tag()(ValidationError::SamePlayerPair { url: first }));
                }
            }
            validate_sets(result.sets()).map_err(tag())?;
        }
        Ok(())
    }
}

/// Tagged union over everything a snapshot bundle may carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotRecord {
    Season(Season),
    Location(Location),
    MatchDate(MatchDate),
    TeamMatchResult(TeamMatchResult),
}

impl SnapshotRecord {
    pub fn url(&self) -> &str {
        match self {
            SnapshotRecord::Season(season) => &season.url,
            SnapshotRecord::Location(location) => &location.name,
            SnapshotRecord::MatchDate(match_date) => &match_date.url,
            SnapshotRecord::TeamMatchResult(result) => &result.url,
        }
    }

    /// Schedule facts must be merged before the results that refer to them.
    pub fn is_schedule(&self) -> bool {
        !matches!(self, SnapshotRecord::TeamMatchResult(_))
    }
}

/// One fetched observation set handed over by the scraper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotBundle {
    pub source_id: String,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub records: Vec<SnapshotRecord>,
}

fn non_empty(entity: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::EmptyKey { entity })
    } else {
        Ok(())
    }
}

fn segments(url: &str) -> Vec<&str> {
    url.trim()
        .trim_end_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect()
}

/// Normalizes a league url to its last two path segments ("…/season/123" -> "season/123").
pub fn url_key(entity: &'static str, url: &str) -> Result<String, ValidationError> {
    let parts = segments(url);
    if parts.is_empty() {
        return Err(ValidationError::EmptyKey { entity });
    }
    let start = parts.len().saturating_sub(2);
    Ok(parts[start..].join("/"))
}

/// Splits a team-match result url into its season key and match date key.
pub fn split_result_url(url: &str) -> Result<(String, String), ValidationError> {
    let parts = segments(url);
    if parts.len() < 4 {
        return Err(ValidationError::MalformedUrl {
            url: url.to_string(),
        });
    }
    let n = parts.len();
    Ok((parts[n - 4..n - 2].join("/"), parts[n - 2..].join("/")))
}

/// Trailing numeric token of a team name, 1 when the name carries none.
pub fn team_number(name: &str) -> u32 {
    name.trim()
        .rsplit(' ')
        .next()
        .filter(|token| !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()))
        .and_then(|token| token.parse().ok())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(n: u32) -> Player {
        Player {
            name: format!("P{n}"),
            url: format!("league/1/player/{n}"),
        }
    }

    #[test]
    fn team_number_defaults_to_one() {
        assert_eq!(team_number("BC Basel 2"), 2);
        assert_eq!(team_number("BC Basel"), 1);
        assert_eq!(team_number("Team 3a"), 1);
        assert_eq!(team_number(""), 1);
    }

    #[test]
    fn url_key_keeps_last_two_segments() {
        assert_eq!(
            url_key("season", "https://league.example/sport/season/123/").unwrap(),
            "season/123"
        );
        assert_eq!(url_key("draw", "draw/1").unwrap(), "draw/1");
        assert_eq!(url_key("team", "7").unwrap(), "7");
        assert_eq!(
            url_key("team", "  / "),
            Err(ValidationError::EmptyKey { entity: "team" })
        );
    }

    #[test]
    fn result_url_splits_into_season_and_match() {
        let (season, match_date) = split_result_url("season/12/team-match/42").unwrap();
        assert_eq!(season, "season/12");
        assert_eq!(match_date, "team-match/42");
        assert!(split_result_url("team-match/42").is_err());
    }

    #[test]
    fn category_codes_round_trip_through_strings() {
        assert_eq!("HD2".parse::<Category>().unwrap(), Category::Hd2);
        assert_eq!(Category::Mx1.to_string(), "MX1");
        assert!("xx9".parse::<Category>().is_err());
        assert!(Category::De1.is_singles());
        assert!(Category::Mx2.is_doubles());
        assert_eq!(Category::all().len(), 9);
    }

    #[test]
    fn set_points_must_be_in_range() {
        assert!(validate_sets([Some(&Set::new(21, 30)), None, None]).is_ok());
        assert_eq!(
            validate_sets([Some(&Set::new(31, 29)), None, None]),
            Err(ValidationError::SetPointsOutOfRange { set: 1, points: 31 })
        );
        assert_eq!(
            validate_sets([Some(&Set::new(21, 1)), Some(&Set::new(-1, 21)), None]),
            Err(ValidationError::SetPointsOutOfRange { set: 2, points: -1 })
        );
    }

    #[test]
    fn later_set_requires_earlier_set() {
        assert_eq!(
            validate_sets([Some(&Set::new(21, 1)), None, Some(&Set::new(21, 1))]),
            Err(ValidationError::SetOrder { set: 3 })
        );
    }

    #[test]
    fn team_result_rejects_category_in_wrong_map() {
        let mut result = TeamMatchResult {
            singles: BTreeMap::new(),
            doubles: BTreeMap::new(),
            winner: Side::Home,
            url: "season/1/team-match/1".into(),
        };
        result.singles.insert(
            Category::Hd1,
            SinglesResult {
                home_player: Some(player(1)),
                away_player: Some(player(2)),
                set_1: None,
                set_2: None,
                set_3: None,
                winner: Side::Home,
                retired: Side::Neither,
            },
        );
        assert!(matches!(
            result.validate(),
            Err(ValidationError::WrongDiscipline { category: Category::Hd1, .. })
        ));
    }

    #[test]
    fn team_result_rejects_pair_of_one_player() {
        let mut result = TeamMatchResult {
            singles: BTreeMap::new(),
            doubles: BTreeMap::new(),
            winner: Side::Home,
            url: "season/1/team-match/1".into(),
        };
        result.doubles.insert(
            Category::Dd1,
            DoublesResult {
                home_pair: Some(DoublesPair {
                    first: player(1),
                    second: player(1),
                }),
                away_pair: None,
                set_1: None,
                set_2: None,
                set_3: None,
                winner: Side::Away,
                retired: Side::Neither,
            },
        );
        let err = result.validate().unwrap_err();
        assert_eq!(err.to_string(), "DD1: doubles pair lists player player/1 twice");
        let ValidationError::InCategory { category, source } = err else {
            panic!("expected the category to be named");
        };
        assert_eq!(category, Category::Dd1);
        assert!(matches!(*source, ValidationError::SamePlayerPair { .. }));
    }

    #[test]
    fn team_result_names_category_of_bad_set() {
        let mut result = TeamMatchResult {
            singles: BTreeMap::new(),
            doubles: BTreeMap::new(),
            winner: Side::Home,
            url: "season/1/team-match/1".into(),
        };
        result.singles.insert(
            Category::He2,
            SinglesResult {
                home_player: Some(player(1)),
                away_player: Some(player(2)),
                set_1: Some(Set::new(31, 29)),
                set_2: None,
                set_3: None,
                winner: Side::Home,
                retired: Side::Neither,
            },
        );
        assert_eq!(
            result.validate(),
            Err(ValidationError::InCategory {
                category: Category::He2,
                source: Box::new(ValidationError::SetPointsOutOfRange { set: 1, points: 31 }),
            })
        );
    }

    #[test]
    fn bundle_deserializes_tagged_records() {
        let json = r#"{
            "source_id": "interclub",
            "fetched_at": "2024-09-30T08:00:00Z",
            "records": [
                {"kind": "location", "name": "Hall A", "address": "Main St 1"},
                {"kind": "match_date", "url": "team-match/1",
                 "date_time": "2024-10-01T19:00:00+02:00",
                 "home_team": {"name": "Home 1", "url": "team/1", "club": {"name": "Home"}},
                 "away_team": {"name": "Away 1", "url": "team/2", "club": {"name": "Away"}}},
                {"kind": "team_match_result", "url": "season/1/team-match/1", "winner": "home",
                 "singles": {"he1": {"winner": "home"}}}
            ]
        }"#;
        let bundle: SnapshotBundle = serde_json::from_str(json).unwrap();
        assert_eq!(bundle.records.len(), 3);
        assert!(bundle.records[0].is_schedule());
        let SnapshotRecord::TeamMatchResult(result) = &bundle.records[2] else {
            panic!("expected a team match result");
        };
        assert_eq!(result.singles[&Category::He1].winner, Side::Home);
        assert_eq!(result.event_count(), 1);
    }
}
