//! Result merger: per-category results, player/pair memberships and team points.

use mada_core as snap;
use mada_core::{split_result_url, url_key, Category, Set, Side, ValidationError};
use mada_storage::{
    MatchDateId, MatchResultId, Outcome, PairId, PlayerId, SideResult, StoreData, TeamId,
    WinningTeam,
};
use serde::Serialize;
use tracing::debug;

use crate::error::{invalid, rejected, MergeError};

/// Team points awarded to each side of a team match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TeamPoints {
    pub home: u32,
    pub away: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultOutcome {
    pub match_date: MatchDateId,
    pub match_result: MatchResultId,
    pub points: TeamPoints,
    pub categories: usize,
}

/// Wins per side across every category entry of the result.
pub fn count_wins(result: &snap::TeamMatchResult) -> TeamPoints {
    let winners = result
        .singles
        .values()
        .map(|r| r.winner)
        .chain(result.doubles.values().map(|r| r.winner));
    let mut wins = TeamPoints::default();
    for winner in winners {
        match winner {
            Side::Home => wins.home += 1,
            Side::Away => wins.away += 1,
            Side::Neither | Side::Both => {}
        }
    }
    wins
}

/// Seven events halve the wins, four count them as they are, none award 3:0 to the declared winner.
pub fn team_points(result: &snap::TeamMatchResult) -> Result<TeamPoints, MergeError> {
    let wins = count_wins(result);
    match result.event_count() {
        0 => Ok(match result.winner {
            Side::Home => TeamPoints { home: 3, away: 0 },
            Side::Away => TeamPoints { home: 0, away: 3 },
            Side::Neither | Side::Both => TeamPoints::default(),
        }),
        4 => Ok(wins),
        7 => Ok(TeamPoints {
            home: wins.home / 2,
            away: wins.away / 2,
        }),
        events => Err(MergeError::UnsupportedTeamFormat {
            url: result.url.clone(),
            events,
        }),
    }
}

/// Finds the already merged match date a result url points at.
pub fn resolve_match_date(store: &StoreData, url: &str) -> Result<MatchDateId, MergeError> {
    let (season_key, match_key) = split_result_url(url).map_err(invalid(url))?;
    store
        .find_season(&season_key)
        .and_then(|season| store.find_match_date(&match_key, season))
        .ok_or_else(|| MergeError::MissingMatchDate {
            url: url.to_string(),
            season_key,
            match_key,
        })
}

fn upsert_player(
    store: &mut StoreData,
    player: &snap::Player,
    url: &str,
) -> Result<PlayerId, MergeError> {
    let key = url_key("player", &player.url).map_err(invalid(url))?;
    if let Some(id) = store.find_player(&key) {
        return Ok(id);
    }
    debug!(player = %key, "creating player");
    store
        .insert_player(&key, &player.name)
        .map_err(rejected(url, format!("player {}", player.name)))
}

fn upsert_pair(
    store: &mut StoreData,
    pair: &snap::DoublesPair,
    url: &str,
) -> Result<PairId, MergeError> {
    let first = upsert_player(store, &pair.first, url)?;
    let second = upsert_player(store, &pair.second, url)?;
    if let Some(id) = store.find_pair(first, second) {
        return Ok(id);
    }
    store
        .insert_pair(first, second)
        .map_err(rejected(url, "doubles pair"))
}

fn set_points(sets: [Option<&Set>; 3], side: Side) -> Result<[Option<u8>; 3], ValidationError> {
    let mut out = [None; 3];
    for (idx, set) in sets.into_iter().enumerate() {
        if let Some(set) = set {
            let points = match side {
                Side::Away => set.away_points,
                _ => set.home_points,
            };
            out[idx] = Some(u8::try_from(points).map_err(|_| {
                ValidationError::SetPointsOutOfRange {
                    set: idx as u8 + 1,
                    points,
                }
            })?);
        }
    }
    Ok(out)
}

/// Builds the row outcome. With one side missing only the participant present and the walkover winner are kept.
fn side_outcome<P: Copy>(
    home: Option<P>,
    away: Option<P>,
    sets: [Option<&Set>; 3],
    winner: Side,
    retired: Side,
) -> Result<Outcome<P>, ValidationError> {
    let walkover = home.is_none() || away.is_none();
    let build = |participant: Option<P>, side: Side| -> Result<Option<SideResult<P>>, ValidationError> {
        let Some(participant) = participant else {
            return Ok(None);
        };
        let points = if walkover {
            [None; 3]
        } else {
            set_points(sets, side)?
        };
        Ok(Some(SideResult {
            participant,
            points,
            win: winner == side,
        }))
    };
    Ok(Outcome {
        home: build(home, Side::Home)?,
        away: build(away, Side::Away)?,
        walkover_winner: walkover.then_some(winner),
        retired,
    })
}

struct Teams {
    home: TeamId,
    away: TeamId,
}

fn merge_singles(
    store: &mut StoreData,
    match_date: MatchDateId,
    teams: &Teams,
    category: Category,
    result: &snap::SinglesResult,
    url: &str,
) -> Result<(), MergeError> {
    let context = || rejected(url, category);
    let home = result
        .home_player
        .as_ref()
        .map(|p| upsert_player(store, p, url))
        .transpose()?;
    let away = result
        .away_player
        .as_ref()
        .map(|p| upsert_player(store, p, url))
        .transpose()?;

    let outcome = side_outcome(home, away, result.sets(), result.winner, result.retired)
        .map_err(ValidationError::in_category(category))
        .map_err(invalid(url))?;
    let row = match store.find_singles_result(match_date, category) {
        Some(id) => id,
        None => store
            .insert_singles_result(match_date, category)
            .map_err(context())?,
    };
    store.set_singles_outcome(row, outcome).map_err(context())?;

    for (player, team) in [(home, teams.home), (away, teams.away)] {
        if let Some(player) = player {
            store.link_player_team(player, team).map_err(context())?;
        }
    }
    Ok(())
}

fn merge_doubles(
    store: &mut StoreData,
    match_date: MatchDateId,
    teams: &Teams,
    category: Category,
    result: &snap::DoublesResult,
    url: &str,
) -> Result<(), MergeError> {
    let context = || rejected(url, category);
    let home = result
        .home_pair
        .as_ref()
        .map(|p| upsert_pair(store, p, url))
        .transpose()?;
    let away = result
        .away_pair
        .as_ref()
        .map(|p| upsert_pair(store, p, url))
        .transpose()?;

    let outcome = side_outcome(home, away, result.sets(), result.winner, result.retired)
        .map_err(ValidationError::in_category(category))
        .map_err(invalid(url))?;
    let row = match store.find_doubles_result(match_date, category) {
        Some(id) => id,
        None => store
            .insert_doubles_result(match_date, category)
            .map_err(context())?,
    };
    store.set_doubles_outcome(row, outcome).map_err(context())?;

    for (pair, team) in [(home, teams.home), (away, teams.away)] {
        let Some(pair) = pair else { continue };
        store.link_pair_team(pair, team).map_err(context())?;
        let (first, second) = store.pair(pair).map_err(context())?.players;
        store.link_player_team(first, team).map_err(context())?;
        store.link_player_team(second, team).map_err(context())?;
    }
    Ok(())
}

/// Merges a published team match result onto its match date. The match date must already exist.
pub fn merge_team_match_result(
    store: &mut StoreData,
    snapshot: &snap::TeamMatchResult,
) -> Result<ResultOutcome, MergeError> {
    let url = snapshot.url.as_str();
    snapshot.validate().map_err(invalid(url))?;
    let points = team_points(snapshot)?;
    let match_date = resolve_match_date(store, url)?;
    let teams = {
        let row = store.match_date(match_date).map_err(rejected(url, "match date"))?;
        Teams {
            home: row.home_team,
            away: row.away_team,
        }
    };

    for (category, result) in &snapshot.singles {
        merge_singles(store, match_date, &teams, *category, result, url)?;
    }
    for (category, result) in &snapshot.doubles {
        merge_doubles(store, match_date, &teams, *category, result, url)?;
    }

    let fail = || rejected(url, "match result");
    let match_result = match store.find_match_result(match_date) {
        Some(id) => id,
        None => store.insert_match_result(match_date).map_err(fail())?,
    };
    store
        .set_match_result(
            match_result,
            WinningTeam::from_side(snapshot.winner),
            snapshot.event_count() == 0,
            points.home,
            points.away,
        )
        .map_err(fail())?;
    debug!(%match_date, home = points.home, away = points.away, "team match scored");

    Ok(ResultOutcome {
        match_date,
        match_result,
        points,
        categories: snapshot.event_count(),
    })
}
