use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use chrono::{DateTime, NaiveDate, Utc};
use mada_core::{Category, Side};
use serde::{Deserialize, Serialize};

use crate::entities::*;
use crate::StoreError;

/// Outcome written onto a singles or doubles result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<P> {
    pub home: Option<SideResult<P>>,
    pub away: Option<SideResult<P>>,
    pub walkover_winner: Option<Side>,
    pub retired: Side,
}

#[derive(Debug, Clone)]
pub struct NewMatchDate {
    pub url: String,
    pub season: SeasonId,
    pub draw: Option<DrawId>,
    pub date_time: DateTime<Utc>,
    pub home_team: TeamId,
    pub away_team: TeamId,
    pub location: Option<LocationId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EntityCounts {
    pub seasons: usize,
    pub draws: usize,
    pub clubs: usize,
    pub teams: usize,
    pub locations: usize,
    pub match_dates: usize,
    pub changelog: usize,
    pub players: usize,
    pub pairs: usize,
    pub singles_results: usize,
    pub doubles_results: usize,
    pub match_results: usize,
    pub memberships: usize,
}

type ChangeKey = (MatchDateId, Option<LocationId>, DateTime<Utc>);

#[derive(Debug, Clone, Default)]
struct Indexes {
    season_by_url: HashMap<String, SeasonId>,
    draw_by_key: HashMap<(String, SeasonId), DrawId>,
    club_by_name: HashMap<String, ClubId>,
    team_by_name: HashMap<String, TeamId>,
    location_by_name: HashMap<String, LocationId>,
    match_date_by_key: HashMap<(String, SeasonId), MatchDateId>,
    changes: HashSet<ChangeKey>,
    player_by_url: HashMap<String, PlayerId>,
    pair_by_players: HashMap<(PlayerId, PlayerId), PairId>,
    singles_by_key: HashMap<(MatchDateId, Category), SinglesResultId>,
    doubles_by_key: HashMap<(MatchDateId, Category), DoublesResultId>,
    result_by_match: HashMap<MatchDateId, MatchResultId>,
}

/// The whole persisted graph. Arenas are addressed by surrogate id; association
/// sets model the many-to-many tables. Unique indexes are derived, never stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreData {
    seasons: Vec<Season>,
    draws: Vec<Draw>,
    clubs: Vec<Club>,
    teams: Vec<Team>,
    locations: Vec<Location>,
    match_dates: Vec<MatchDate>,
    changelog: Vec<ChangeLogEntry>,
    players: Vec<Player>,
    pairs: Vec<DoublesPair>,
    singles_results: Vec<SinglesResult>,
    doubles_results: Vec<DoublesResult>,
    match_results: Vec<MatchResult>,
    team_seasons: BTreeSet<(TeamId, SeasonId)>,
    club_seasons: BTreeSet<(ClubId, SeasonId)>,
    team_draws: BTreeSet<(TeamId, DrawId)>,
    player_teams: BTreeSet<(PlayerId, TeamId)>,
    pair_teams: BTreeSet<(PairId, TeamId)>,
    sequence: u64,
    #[serde(skip)]
    index: Indexes,
}

fn claim<K: Eq + Hash, V>(
    map: &mut HashMap<K, V>,
    key: K,
    value: V,
    entity: &'static str,
    display: impl FnOnce() -> String,
) -> Result<(), StoreError> {
    if map.contains_key(&key) {
        return Err(StoreError::UniqueViolation {
            entity,
            key: display(),
        });
    }
    map.insert(key, value);
    Ok(())
}

fn row<'a, T>(rows: &'a [T], entity: &'static str, id: u32) -> Result<&'a T, StoreError> {
    rows.get(id as usize)
        .ok_or(StoreError::UnknownId { entity, id })
}

fn row_mut<'a, T>(rows: &'a mut [T], entity: &'static str, id: u32) -> Result<&'a mut T, StoreError> {
    rows.get_mut(id as usize)
        .ok_or(StoreError::UnknownId { entity, id })
}

fn check_arena<T>(
    rows: &[T],
    entity: &'static str,
    id_of: impl Fn(&T) -> u32,
) -> Result<(), StoreError> {
    for (idx, item) in rows.iter().enumerate() {
        if id_of(item) as usize != idx {
            return Err(StoreError::Corrupt(format!(
                "{entity} at position {idx} carries id {}",
                id_of(item)
            )));
        }
    }
    Ok(())
}

impl StoreData {
    /// Rebuilds the unique indexes after deserialization. Arena positions, unique
    /// keys and foreign keys of the loaded rows are all re-checked.
    pub fn rebuild_indexes(&mut self) -> Result<(), StoreError> {
        check_arena(&self.seasons, SeasonId::ENTITY, |r| r.id.0)?;
        check_arena(&self.draws, DrawId::ENTITY, |r| r.id.0)?;
        check_arena(&self.clubs, ClubId::ENTITY, |r| r.id.0)?;
        check_arena(&self.teams, TeamId::ENTITY, |r| r.id.0)?;
        check_arena(&self.locations, LocationId::ENTITY, |r| r.id.0)?;
        check_arena(&self.match_dates, MatchDateId::ENTITY, |r| r.id.0)?;
        check_arena(&self.players, PlayerId::ENTITY, |r| r.id.0)?;
        check_arena(&self.pairs, PairId::ENTITY, |r| r.id.0)?;
        check_arena(&self.singles_results, SinglesResultId::ENTITY, |r| r.id.0)?;
        check_arena(&self.doubles_results, DoublesResultId::ENTITY, |r| r.id.0)?;
        check_arena(&self.match_results, MatchResultId::ENTITY, |r| r.id.0)?;

        let mut index = Indexes::default();
        for s in &self.seasons {
            claim(&mut index.season_by_url, s.url.clone(), s.id, SeasonId::ENTITY, || s.url.clone())?;
        }
        for d in &self.draws {
            claim(&mut index.draw_by_key, (d.url.clone(), d.season), d.id, DrawId::ENTITY, || {
                format!("{} in {}", d.url, d.season)
            })?;
        }
        for c in &self.clubs {
            claim(&mut index.club_by_name, c.name.clone(), c.id, ClubId::ENTITY, || c.name.clone())?;
        }
        for t in &self.teams {
            claim(&mut index.team_by_name, t.name.clone(), t.id, TeamId::ENTITY, || t.name.clone())?;
        }
        for l in &self.locations {
            claim(&mut index.location_by_name, l.name.clone(), l.id, LocationId::ENTITY, || {
                l.name.clone()
            })?;
        }
        for m in &self.match_dates {
            claim(
                &mut index.match_date_by_key,
                (m.url.clone(), m.season),
                m.id,
                MatchDateId::ENTITY,
                || format!("{} in {}", m.url, m.season),
            )?;
        }
        for e in &self.changelog {
            if !index.changes.insert((e.match_date, e.location, e.date_time)) {
                return Err(StoreError::UniqueViolation {
                    entity: "changelog_entry",
                    key: format!("{} at {}", e.match_date, e.date_time),
                });
            }
        }
        for p in &self.players {
            claim(&mut index.player_by_url, p.url.clone(), p.id, PlayerId::ENTITY, || p.url.clone())?;
        }
        for p in &self.pairs {
            let key = DoublesPair::canonical(p.players.0, p.players.1);
            claim(&mut index.pair_by_players, key, p.id, PairId::ENTITY, || {
                format!("{} / {}", key.0, key.1)
            })?;
        }
        for r in &self.singles_results {
            claim(
                &mut index.singles_by_key,
                (r.match_date, r.category),
                r.id,
                SinglesResultId::ENTITY,
                || format!("{} {}", r.match_date, r.category),
            )?;
        }
        for r in &self.doubles_results {
            claim(
                &mut index.doubles_by_key,
                (r.match_date, r.category),
                r.id,
                DoublesResultId::ENTITY,
                || format!("{} {}", r.match_date, r.category),
            )?;
        }
        for r in &self.match_results {
            claim(&mut index.result_by_match, r.match_date, r.id, MatchResultId::ENTITY, || {
                r.match_date.to_string()
            })?;
        }
        self.index = index;
        self.check_references()
    }

    fn check_references(&self) -> Result<(), StoreError> {
        for d in &self.draws {
            self.season(d.season).map_err(StoreError::dangling)?;
        }
        for t in &self.teams {
            self.club(t.club).map_err(StoreError::dangling)?;
        }
        for m in &self.match_dates {
            self.season(m.season).map_err(StoreError::dangling)?;
            self.team(m.home_team).map_err(StoreError::dangling)?;
            self.team(m.away_team).map_err(StoreError::dangling)?;
            if let Some(draw) = m.draw {
                self.draw(draw).map_err(StoreError::dangling)?;
            }
            if let Some(location) = m.location {
                self.location(location).map_err(StoreError::dangling)?;
            }
        }
        for e in &self.changelog {
            self.match_date(e.match_date).map_err(StoreError::dangling)?;
            if let Some(location) = e.location {
                self.location(location).map_err(StoreError::dangling)?;
            }
        }
        for p in &self.pairs {
            self.player(p.players.0).map_err(StoreError::dangling)?;
            self.player(p.players.1).map_err(StoreError::dangling)?;
        }
        for r in &self.singles_results {
            self.match_date(r.match_date).map_err(StoreError::dangling)?;
            for side in [r.home, r.away].into_iter().flatten() {
                self.player(side.participant).map_err(StoreError::dangling)?;
            }
        }
        for r in &self.doubles_results {
            self.match_date(r.match_date).map_err(StoreError::dangling)?;
            for side in [r.home, r.away].into_iter().flatten() {
                self.pair(side.participant).map_err(StoreError::dangling)?;
            }
        }
        for r in &self.match_results {
            self.match_date(r.match_date).map_err(StoreError::dangling)?;
        }
        for &(team, season) in &self.team_seasons {
            self.team(team).map_err(StoreError::dangling)?;
            self.season(season).map_err(StoreError::dangling)?;
        }
        for &(club, season) in &self.club_seasons {
            self.club(club).map_err(StoreError::dangling)?;
            self.season(season).map_err(StoreError::dangling)?;
        }
        for &(team, draw) in &self.team_draws {
            self.team(team).map_err(StoreError::dangling)?;
            self.draw(draw).map_err(StoreError::dangling)?;
        }
        for &(player, team) in &self.player_teams {
            self.player(player).map_err(StoreError::dangling)?;
            self.team(team).map_err(StoreError::dangling)?;
        }
        for &(pair, team) in &self.pair_teams {
            self.pair(pair).map_err(StoreError::dangling)?;
            self.team(team).map_err(StoreError::dangling)?;
        }
        Ok(())
    }

    pub fn counts(&self) -> EntityCounts {
        EntityCounts {
            seasons: self.seasons.len(),
            draws: self.draws.len(),
            clubs: self.clubs.len(),
            teams: self.teams.len(),
            locations: self.locations.len(),
            match_dates: self.match_dates.len(),
            changelog: self.changelog.len(),
            players: self.players.len(),
            pairs: self.pairs.len(),
            singles_results: self.singles_results.len(),
            doubles_results: self.doubles_results.len(),
            match_results: self.match_results.len(),
            memberships: self.team_seasons.len()
                + self.club_seasons.len()
                + self.team_draws.len()
                + self.player_teams.len()
                + self.pair_teams.len(),
        }
    }

    pub fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    // Seasons and draws.

    pub fn seasons(&self) -> &[Season] {
        &self.seasons
    }

    pub fn season(&self, id: SeasonId) -> Result<&Season, StoreError> {
        row(&self.seasons, SeasonId::ENTITY, id.0)
    }

    pub fn find_season(&self, url: &str) -> Option<SeasonId> {
        self.index.season_by_url.get(url).copied()
    }

    pub fn insert_season(
        &mut self,
        url: &str,
        name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<SeasonId, StoreError> {
        let id = SeasonId::from_index(self.seasons.len());
        claim(&mut self.index.season_by_url, url.to_string(), id, SeasonId::ENTITY, || {
            url.to_string()
        })?;
        self.seasons.push(Season {
            id,
            url: url.to_string(),
            name: name.to_string(),
            start_date,
            end_date,
        });
        Ok(id)
    }

    pub fn update_season(
        &mut self,
        id: SeasonId,
        name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<(), StoreError> {
        let season = row_mut(&mut self.seasons, SeasonId::ENTITY, id.0)?;
        season.name = name.to_string();
        season.start_date = start_date;
        season.end_date = end_date;
        Ok(())
    }

    pub fn draws(&self) -> &[Draw] {
        &self.draws
    }

    pub fn draw(&self, id: DrawId) -> Result<&Draw, StoreError> {
        row(&self.draws, DrawId::ENTITY, id.0)
    }

    pub fn find_draw(&self, url: &str, season: SeasonId) -> Option<DrawId> {
        self.index
            .draw_by_key
            .get(&(url.to_string(), season))
            .copied()
    }

    pub fn insert_draw(&mut self, url: &str, season: SeasonId) -> Result<DrawId, StoreError> {
        self.season(season).map_err(StoreError::dangling)?;
        let id = DrawId::from_index(self.draws.len());
        claim(
            &mut self.index.draw_by_key,
            (url.to_string(), season),
            id,
            DrawId::ENTITY,
            || format!("{url} in {season}"),
        )?;
        self.draws.push(Draw {
            id,
            url: url.to_string(),
            season,
        });
        Ok(id)
    }

    // Clubs and teams.

    pub fn clubs(&self) -> &[Club] {
        &self.clubs
    }

    pub fn club(&self, id: ClubId) -> Result<&Club, StoreError> {
        row(&self.clubs, ClubId::ENTITY, id.0)
    }

    pub fn find_club(&self, name: &str) -> Option<ClubId> {
        self.index.club_by_name.get(name).copied()
    }

    pub fn insert_club(&mut self, name: &str) -> Result<ClubId, StoreError> {
        let id = ClubId::from_index(self.clubs.len());
        claim(&mut self.index.club_by_name, name.to_string(), id, ClubId::ENTITY, || {
            name.to_string()
        })?;
        self.clubs.push(Club {
            id,
            name: name.to_string(),
        });
        Ok(id)
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn team(&self, id: TeamId) -> Result<&Team, StoreError> {
        row(&self.teams, TeamId::ENTITY, id.0)
    }

    pub fn find_team(&self, name: &str) -> Option<TeamId> {
        self.index.team_by_name.get(name).copied()
    }

    pub fn insert_team(
        &mut self,
        name: &str,
        url: &str,
        team_nr: u32,
        club: ClubId,
    ) -> Result<TeamId, StoreError> {
        self.club(club).map_err(StoreError::dangling)?;
        let id = TeamId::from_index(self.teams.len());
        claim(&mut self.index.team_by_name, name.to_string(), id, TeamId::ENTITY, || {
            name.to_string()
        })?;
        self.teams.push(Team {
            id,
            name: name.to_string(),
            url: url.to_string(),
            team_nr,
            club,
        });
        Ok(id)
    }

    pub fn update_team(&mut self, id: TeamId, url: &str, club: ClubId) -> Result<(), StoreError> {
        self.club(club).map_err(StoreError::dangling)?;
        let team = row_mut(&mut self.teams, TeamId::ENTITY, id.0)?;
        team.url = url.to_string();
        team.club = club;
        Ok(())
    }

    pub fn link_team_season(&mut self, team: TeamId, season: SeasonId) -> Result<bool, StoreError> {
        self.team(team).map_err(StoreError::dangling)?;
        self.season(season).map_err(StoreError::dangling)?;
        Ok(self.team_seasons.insert((team, season)))
    }

    pub fn link_club_season(&mut self, club: ClubId, season: SeasonId) -> Result<bool, StoreError> {
        self.club(club).map_err(StoreError::dangling)?;
        self.season(season).map_err(StoreError::dangling)?;
        Ok(self.club_seasons.insert((club, season)))
    }

    pub fn link_team_draw(&mut self, team: TeamId, draw: DrawId) -> Result<bool, StoreError> {
        self.team(team).map_err(StoreError::dangling)?;
        self.draw(draw).map_err(StoreError::dangling)?;
        Ok(self.team_draws.insert((team, draw)))
    }

    pub fn seasons_of_team(&self, team: TeamId) -> Vec<SeasonId> {
        self.team_seasons
            .iter()
            .filter(|(t, _)| *t == team)
            .map(|(_, s)| *s)
            .collect()
    }

    pub fn teams_of_season(&self, season: SeasonId) -> Vec<TeamId> {
        self.team_seasons
            .iter()
            .filter(|(_, s)| *s == season)
            .map(|(t, _)| *t)
            .collect()
    }

    pub fn clubs_of_season(&self, season: SeasonId) -> Vec<ClubId> {
        self.club_seasons
            .iter()
            .filter(|(_, s)| *s == season)
            .map(|(c, _)| *c)
            .collect()
    }

    pub fn teams_of_draw(&self, draw: DrawId) -> Vec<TeamId> {
        self.team_draws
            .iter()
            .filter(|(_, d)| *d == draw)
            .map(|(t, _)| *t)
            .collect()
    }

    // Locations.

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn location(&self, id: LocationId) -> Result<&Location, StoreError> {
        row(&self.locations, LocationId::ENTITY, id.0)
    }

    pub fn find_location(&self, name: &str) -> Option<LocationId> {
        self.index.location_by_name.get(name).copied()
    }

    pub fn insert_location(&mut self, name: &str, address: &str) -> Result<LocationId, StoreError> {
        let id = LocationId::from_index(self.locations.len());
        claim(&mut self.index.location_by_name, name.to_string(), id, LocationId::ENTITY, || {
            name.to_string()
        })?;
        self.locations.push(Location {
            id,
            name: name.to_string(),
            address: address.to_string(),
        });
        Ok(id)
    }

    pub fn set_location_address(&mut self, id: LocationId, address: &str) -> Result<(), StoreError> {
        row_mut(&mut self.locations, LocationId::ENTITY, id.0)?.address = address.to_string();
        Ok(())
    }

    // Match dates and their history.

    pub fn match_dates(&self) -> &[MatchDate] {
        &self.match_dates
    }

    pub fn match_date(&self, id: MatchDateId) -> Result<&MatchDate, StoreError> {
        row(&self.match_dates, MatchDateId::ENTITY, id.0)
    }

    pub fn find_match_date(&self, url: &str, season: SeasonId) -> Option<MatchDateId> {
        self.index
            .match_date_by_key
            .get(&(url.to_string(), season))
            .copied()
    }

    pub fn insert_match_date(&mut self, new: NewMatchDate) -> Result<MatchDateId, StoreError> {
        self.season(new.season).map_err(StoreError::dangling)?;
        self.team(new.home_team).map_err(StoreError::dangling)?;
        self.team(new.away_team).map_err(StoreError::dangling)?;
        if let Some(draw) = new.draw {
            self.draw(draw).map_err(StoreError::dangling)?;
        }
        if let Some(location) = new.location {
            self.location(location).map_err(StoreError::dangling)?;
        }
        let id = MatchDateId::from_index(self.match_dates.len());
        claim(
            &mut self.index.match_date_by_key,
            (new.url.clone(), new.season),
            id,
            MatchDateId::ENTITY,
            || format!("{} in {}", new.url, new.season),
        )?;
        self.match_dates.push(MatchDate {
            id,
            url: new.url,
            season: new.season,
            draw: new.draw,
            date_time: new.date_time,
            home_team: new.home_team,
            away_team: new.away_team,
            location: new.location,
        });
        Ok(id)
    }

    pub fn set_match_slot(
        &mut self,
        id: MatchDateId,
        date_time: DateTime<Utc>,
        location: Option<LocationId>,
    ) -> Result<(), StoreError> {
        if let Some(location) = location {
            self.location(location).map_err(StoreError::dangling)?;
        }
        let match_date = row_mut(&mut self.match_dates, MatchDateId::ENTITY, id.0)?;
        match_date.date_time = date_time;
        match_date.location = location;
        Ok(())
    }

    pub fn set_match_draw(&mut self, id: MatchDateId, draw: Option<DrawId>) -> Result<(), StoreError> {
        if let Some(draw) = draw {
            self.draw(draw).map_err(StoreError::dangling)?;
        }
        row_mut(&mut self.match_dates, MatchDateId::ENTITY, id.0)?.draw = draw;
        Ok(())
    }

    pub fn match_dates_of_team(&self, team: TeamId) -> Vec<&MatchDate> {
        self.match_dates.iter().filter(|m| m.involves(team)).collect()
    }

    pub fn match_dates_at(&self, location: LocationId) -> Vec<&MatchDate> {
        self.match_dates
            .iter()
            .filter(|m| m.location == Some(location))
            .collect()
    }

    /// History of a match date, oldest archived slot first.
    pub fn changelog(&self, match_date: MatchDateId) -> Vec<&ChangeLogEntry> {
        let mut entries: Vec<_> = self
            .changelog
            .iter()
            .filter(|e| e.match_date == match_date)
            .collect();
        entries.sort_by_key(|e| e.sequence);
        entries
    }

    pub fn last_change(&self, match_date: MatchDateId) -> Option<&ChangeLogEntry> {
        self.changelog
            .iter()
            .filter(|e| e.match_date == match_date)
            .max_by_key(|e| e.sequence)
    }

    pub fn has_change(
        &self,
        match_date: MatchDateId,
        date_time: DateTime<Utc>,
        location: Option<LocationId>,
    ) -> bool {
        self.index.changes.contains(&(match_date, location, date_time))
    }

    pub fn append_change(
        &mut self,
        match_date: MatchDateId,
        date_time: DateTime<Utc>,
        location: Option<LocationId>,
        archived_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.match_date(match_date).map_err(StoreError::dangling)?;
        if let Some(location) = location {
            self.location(location).map_err(StoreError::dangling)?;
        }
        if !self.index.changes.insert((match_date, location, date_time)) {
            return Err(StoreError::UniqueViolation {
                entity: "changelog_entry",
                key: format!("{match_date} at {date_time}"),
            });
        }
        let sequence = self.next_sequence();
        self.changelog.push(ChangeLogEntry {
            match_date,
            location,
            date_time,
            archived_at,
            sequence,
        });
        Ok(sequence)
    }

    /// Moves an already archived slot to the end of the history instead of duplicating it.
    pub fn rearchive_change(
        &mut self,
        match_date: MatchDateId,
        date_time: DateTime<Utc>,
        location: Option<LocationId>,
        archived_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let sequence = self.next_sequence();
        let entry = self
            .changelog
            .iter_mut()
            .find(|e| e.match_date == match_date && e.location == location && e.date_time == date_time)
            .ok_or(StoreError::UnknownId {
                entity: "changelog_entry",
                id: match_date.0,
            })?;
        entry.archived_at = archived_at;
        entry.sequence = sequence;
        Ok(sequence)
    }

    // Players and pairs.

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Result<&Player, StoreError> {
        row(&self.players, PlayerId::ENTITY, id.0)
    }

    pub fn find_player(&self, url: &str) -> Option<PlayerId> {
        self.index.player_by_url.get(url).copied()
    }

    pub fn insert_player(&mut self, url: &str, name: &str) -> Result<PlayerId, StoreError> {
        let id = PlayerId::from_index(self.players.len());
        claim(&mut self.index.player_by_url, url.to_string(), id, PlayerId::ENTITY, || {
            url.to_string()
        })?;
        self.players.push(Player {
            id,
            url: url.to_string(),
            name: name.to_string(),
        });
        Ok(id)
    }

    pub fn pairs(&self) -> &[DoublesPair] {
        &self.pairs
    }

    pub fn pair(&self, id: PairId) -> Result<&DoublesPair, StoreError> {
        row(&self.pairs, PairId::ENTITY, id.0)
    }

    /// Argument order does not matter.
    pub fn find_pair(&self, a: PlayerId, b: PlayerId) -> Option<PairId> {
        self.index
            .pair_by_players
            .get(&DoublesPair::canonical(a, b))
            .copied()
    }

    /// Fails with a unique violation when the two players already form a pair.
    pub fn insert_pair(&mut self, a: PlayerId, b: PlayerId) -> Result<PairId, StoreError> {
        if a == b {
            return Err(StoreError::InvalidPair { player: a });
        }
        self.player(a).map_err(StoreError::dangling)?;
        self.player(b).map_err(StoreError::dangling)?;
        let players = DoublesPair::canonical(a, b);
        let id = PairId::from_index(self.pairs.len());
        claim(&mut self.index.pair_by_players, players, id, PairId::ENTITY, || {
            format!("{} / {}", players.0, players.1)
        })?;
        self.pairs.push(DoublesPair { id, players });
        Ok(id)
    }

    pub fn pairs_of_player(&self, player: PlayerId) -> Vec<PairId> {
        self.pairs
            .iter()
            .filter(|p| p.contains(player))
            .map(|p| p.id)
            .collect()
    }

    pub fn link_player_team(&mut self, player: PlayerId, team: TeamId) -> Result<bool, StoreError> {
        self.player(player).map_err(StoreError::dangling)?;
        self.team(team).map_err(StoreError::dangling)?;
        Ok(self.player_teams.insert((player, team)))
    }

    pub fn link_pair_team(&mut self, pair: PairId, team: TeamId) -> Result<bool, StoreError> {
        self.pair(pair).map_err(StoreError::dangling)?;
        self.team(team).map_err(StoreError::dangling)?;
        Ok(self.pair_teams.insert((pair, team)))
    }

    pub fn teams_of_player(&self, player: PlayerId) -> Vec<TeamId> {
        self.player_teams
            .iter()
            .filter(|(p, _)| *p == player)
            .map(|(_, t)| *t)
            .collect()
    }

    pub fn teams_of_pair(&self, pair: PairId) -> Vec<TeamId> {
        self.pair_teams
            .iter()
            .filter(|(p, _)| *p == pair)
            .map(|(_, t)| *t)
            .collect()
    }

    // Results.

    pub fn singles_result(&self, id: SinglesResultId) -> Result<&SinglesResult, StoreError> {
        row(&self.singles_results, SinglesResultId::ENTITY, id.0)
    }

    pub fn find_singles_result(&self, match_date: MatchDateId, category: Category) -> Option<SinglesResultId> {
        self.index.singles_by_key.get(&(match_date, category)).copied()
    }

    pub fn insert_singles_result(
        &mut self,
        match_date: MatchDateId,
        category: Category,
    ) -> Result<SinglesResultId, StoreError> {
        self.match_date(match_date).map_err(StoreError::dangling)?;
        let id = SinglesResultId::from_index(self.singles_results.len());
        claim(
            &mut self.index.singles_by_key,
            (match_date, category),
            id,
            SinglesResultId::ENTITY,
            || format!("{match_date} {category}"),
        )?;
        self.singles_results
            .push(CategoryResult::new(id, match_date, category));
        Ok(id)
    }

    pub fn set_singles_outcome(
        &mut self,
        id: SinglesResultId,
        outcome: Outcome<PlayerId>,
    ) -> Result<(), StoreError> {
        for side in [&outcome.home, &outcome.away].into_iter().flatten() {
            self.player(side.participant).map_err(StoreError::dangling)?;
        }
        let result = row_mut(&mut self.singles_results, SinglesResultId::ENTITY, id.0)?;
        result.home = outcome.home;
        result.away = outcome.away;
        result.walkover_winner = outcome.walkover_winner;
        result.retired = outcome.retired;
        Ok(())
    }

    pub fn singles_results_of(&self, match_date: MatchDateId) -> Vec<&SinglesResult> {
        let mut rows: Vec<_> = self
            .singles_results
            .iter()
            .filter(|r| r.match_date == match_date)
            .collect();
        rows.sort_by_key(|r| r.category);
        rows
    }

    pub fn doubles_result(&self, id: DoublesResultId) -> Result<&DoublesResult, StoreError> {
        row(&self.doubles_results, DoublesResultId::ENTITY, id.0)
    }

    pub fn find_doubles_result(&self, match_date: MatchDateId, category: Category) -> Option<DoublesResultId> {
        self.index.doubles_by_key.get(&(match_date, category)).copied()
    }

    pub fn insert_doubles_result(
        &mut self,
        match_date: MatchDateId,
        category: Category,
    ) -> Result<DoublesResultId, StoreError> {
        self.match_date(match_date).map_err(StoreError::dangling)?;
        let id = DoublesResultId::from_index(self.doubles_results.len());
        claim(
            &mut self.index.doubles_by_key,
            (match_date, category),
            id,
            DoublesResultId::ENTITY,
            || format!("{match_date} {category}"),
        )?;
        self.doubles_results
            .push(CategoryResult::new(id, match_date, category));
        Ok(id)
    }

    pub fn set_doubles_outcome(
        &mut self,
        id: DoublesResultId,
        outcome: Outcome<PairId>,
    ) -> Result<(), StoreError> {
        for side in [&outcome.home, &outcome.away].into_iter().flatten() {
            self.pair(side.participant).map_err(StoreError::dangling)?;
        }
        let result = row_mut(&mut self.doubles_results, DoublesResultId::ENTITY, id.0)?;
        result.home = outcome.home;
        result.away = outcome.away;
        result.walkover_winner = outcome.walkover_winner;
        result.retired = outcome.retired;
        Ok(())
    }

    pub fn doubles_results_of(&self, match_date: MatchDateId) -> Vec<&DoublesResult> {
        let mut rows: Vec<_> = self
            .doubles_results
            .iter()
            .filter(|r| r.match_date == match_date)
            .collect();
        rows.sort_by_key(|r| r.category);
        rows
    }

    pub fn match_result(&self, id: MatchResultId) -> Result<&MatchResult, StoreError> {
        row(&self.match_results, MatchResultId::ENTITY, id.0)
    }

    pub fn find_match_result(&self, match_date: MatchDateId) -> Option<MatchResultId> {
        self.index.result_by_match.get(&match_date).copied()
    }

    pub fn match_results(&self) -> &[MatchResult] {
        &self.match_results
    }

    pub fn insert_match_result(&mut self, match_date: MatchDateId) -> Result<MatchResultId, StoreError> {
        self.match_date(match_date).map_err(StoreError::dangling)?;
        let id = MatchResultId::from_index(self.match_results.len());
        claim(&mut self.index.result_by_match, match_date, id, MatchResultId::ENTITY, || {
            match_date.to_string()
        })?;
        self.match_results.push(MatchResult {
            id,
            match_date,
            winner: None,
            walkover: false,
            home_points: 0,
            away_points: 0,
        });
        Ok(id)
    }

    pub fn set_match_result(
        &mut self,
        id: MatchResultId,
        winner: Option<WinningTeam>,
        walkover: bool,
        home_points: u32,
        away_points: u32,
    ) -> Result<(), StoreError> {
        let result = row_mut(&mut self.match_results, MatchResultId::ENTITY, id.0)?;
        result.winner = winner;
        result.walkover = walkover;
        result.home_points = home_points;
        result.away_points = away_points;
        Ok(())
    }
}
