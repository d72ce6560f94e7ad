//! Persisted entity rows. Relationships are surrogate-id references, never owned values.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use mada_core::{Category, Side};
use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($name:ident, $label:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub const ENTITY: &'static str = $label;

            pub(crate) fn from_index(index: usize) -> Self {
                Self(index as u32)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $label, self.0)
            }
        }
    };
}

entity_id!(SeasonId, "season");
entity_id!(DrawId, "draw");
entity_id!(ClubId, "club");
entity_id!(TeamId, "team");
entity_id!(LocationId, "location");
entity_id!(MatchDateId, "match_date");
entity_id!(PlayerId, "player");
entity_id!(PairId, "doubles_pair");
entity_id!(SinglesResultId, "singles_result");
entity_id!(DoublesResultId, "doubles_result");
entity_id!(MatchResultId, "match_result");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub id: SeasonId,
    pub url: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draw {
    pub id: DrawId,
    pub url: String,
    pub season: SeasonId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Club {
    pub id: ClubId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub url: String,
    pub team_nr: u32,
    pub club: ClubId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchDate {
    pub id: MatchDateId,
    pub url: String,
    pub season: SeasonId,
    pub draw: Option<DrawId>,
    pub date_time: DateTime<Utc>,
    pub home_team: TeamId,
    pub away_team: TeamId,
    pub location: Option<LocationId>,
}

impl MatchDate {
    pub fn involves(&self, team: TeamId) -> bool {
        self.home_team == team || self.away_team == team
    }

    pub fn slot(&self) -> (DateTime<Utc>, Option<LocationId>) {
        (self.date_time, self.location)
    }
}

/// Archived previous slot of a match date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub match_date: MatchDateId,
    pub location: Option<LocationId>,
    pub date_time: DateTime<Utc>,
    pub archived_at: DateTime<Utc>,
    /// Store-wide monotonic counter; orders history independent of wall clocks.
    pub sequence: u64,
}

impl ChangeLogEntry {
    pub fn slot(&self) -> (DateTime<Utc>, Option<LocationId>) {
        (self.date_time, self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub url: String,
    pub name: String,
}

/// Canonical doubles pair: members are kept sorted so `(a, b)` and `(b, a)` coincide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoublesPair {
    pub id: PairId,
    pub players: (PlayerId, PlayerId),
}

impl DoublesPair {
    pub fn canonical(a: PlayerId, b: PlayerId) -> (PlayerId, PlayerId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.players.0 == player || self.players.1 == player
    }
}

/// One side's outcome in a singles or doubles result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideResult<P> {
    pub participant: P,
    pub points: [Option<u8>; 3],
    pub win: bool,
}

/// Per-category result row; `P` is a player id for singles and a pair id for doubles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryResult<I, P> {
    pub id: I,
    pub match_date: MatchDateId,
    pub category: Category,
    pub home: Option<SideResult<P>>,
    pub away: Option<SideResult<P>>,
    pub walkover_winner: Option<Side>,
    #[serde(default)]
    pub retired: Side,
}

pub type SinglesResult = CategoryResult<SinglesResultId, PlayerId>;
pub type DoublesResult = CategoryResult<DoublesResultId, PairId>;

impl<I, P> CategoryResult<I, P> {
    pub fn new(id: I, match_date: MatchDateId, category: Category) -> Self {
        Self {
            id,
            match_date,
            category,
            home: None,
            away: None,
            walkover_winner: None,
            retired: Side::Neither,
        }
    }

    pub fn is_walkover(&self) -> bool {
        self.home.is_none() || self.away.is_none()
    }

    pub fn winner(&self) -> Side {
        match (&self.home, &self.away) {
            (Some(home), Some(away)) => match (home.win, away.win) {
                (true, false) => Side::Home,
                (false, true) => Side::Away,
                (true, true) => Side::Both,
                (false, false) => Side::Neither,
            },
            _ => self.walkover_winner.unwrap_or_default(),
        }
    }

    /// Set scores as "21:15 18:21 21:9", skipping unplayed sets.
    pub fn points_display(&self) -> String {
        let (Some(home), Some(away)) = (&self.home, &self.away) else {
            return String::new();
        };
        home.points
            .iter()
            .zip(away.points.iter())
            .filter(|(h, a)| h.is_some() || a.is_some())
            .map(|(h, a)| {
                format!(
                    "{}:{}",
                    h.map(|p| p.to_string()).unwrap_or_default(),
                    a.map(|p| p.to_string()).unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WinningTeam {
    Home,
    Away,
}

impl WinningTeam {
    pub fn from_side(side: Side) -> Option<Self> {
        match side {
            Side::Home => Some(WinningTeam::Home),
            Side::Away => Some(WinningTeam::Away),
            Side::Neither | Side::Both => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub id: MatchResultId,
    pub match_date: MatchDateId,
    pub winner: Option<WinningTeam>,
    pub walkover: bool,
    pub home_points: u32,
    pub away_points: u32,
}
