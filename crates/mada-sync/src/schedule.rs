//! Schedule merger: snapshot match dates and their ancestry into the store.

use chrono::{DateTime, Utc};
use mada_core as snap;
use mada_core::url_key;
use mada_storage::{
    ClubId, DrawId, LocationId, MatchDateId, NewMatchDate, SeasonId, StoreData, TeamId,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{invalid, rejected, MergeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotChange {
    Created,
    Unchanged,
    /// The slot moved; `archived` is false when the prior slot was already the latest history entry.
    Moved { archived: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub match_date: MatchDateId,
    pub change: SlotChange,
}

pub fn merge_season(store: &mut StoreData, season: &snap::Season) -> Result<SeasonId, MergeError> {
    let url = url_key("season", &season.url).map_err(invalid(&season.url))?;
    let fail = || rejected(&season.url, "season");
    match store.find_season(&url) {
        Some(id) => {
            store
                .update_season(id, &season.name, season.start_date, season.end_date)
                .map_err(fail())?;
            Ok(id)
        }
        None => {
            debug!(%url, "creating season");
            store
                .insert_season(&url, &season.name, season.start_date, season.end_date)
                .map_err(fail())
        }
    }
}

pub fn merge_draw(
    store: &mut StoreData,
    draw: &snap::Draw,
    season: SeasonId,
) -> Result<DrawId, MergeError> {
    let url = url_key("draw", &draw.url).map_err(invalid(&draw.url))?;
    if let Some(id) = store.find_draw(&url, season) {
        return Ok(id);
    }
    debug!(%url, %season, "creating draw");
    store
        .insert_draw(&url, season)
        .map_err(rejected(&draw.url, "draw"))
}

/// Address is overwritten on every observation; only the match slot keeps history.
pub fn merge_location(
    store: &mut StoreData,
    location: &snap::Location,
) -> Result<LocationId, MergeError> {
    let name = location.name.trim();
    if name.is_empty() {
        return Err(MergeError::Invalid {
            url: location.name.clone(),
            source: snap::ValidationError::EmptyKey { entity: "location" },
        });
    }
    let fail = || rejected(name, "location");
    match store.find_location(name) {
        Some(id) => {
            store
                .set_location_address(id, &location.address)
                .map_err(fail())?;
            Ok(id)
        }
        None => {
            debug!(name, "creating location");
            store
                .insert_location(name, &location.address)
                .map_err(fail())
        }
    }
}

fn merge_club(store: &mut StoreData, club: &snap::Club) -> Result<ClubId, MergeError> {
    if let Some(id) = store.find_club(&club.name) {
        return Ok(id);
    }
    debug!(name = %club.name, "creating club");
    store
        .insert_club(&club.name)
        .map_err(rejected(&club.name, "club"))
}

fn merge_team(
    store: &mut StoreData,
    team: &snap::Team,
    season: SeasonId,
    draw: Option<DrawId>,
) -> Result<TeamId, MergeError> {
    let club = merge_club(store, &team.club)?;
    let fail = || rejected(&team.url, format!("team {}", team.name));
    let id = match store.find_team(&team.name) {
        Some(id) => {
            store.update_team(id, &team.url, club).map_err(fail())?;
            id
        }
        None => {
            debug!(name = %team.name, "creating team");
            store
                .insert_team(&team.name, &team.url, team.team_number(), club)
                .map_err(fail())?
        }
    };
    store.link_team_season(id, season).map_err(fail())?;
    store.link_club_season(club, season).map_err(fail())?;
    if let Some(draw) = draw {
        store.link_team_draw(id, draw).map_err(fail())?;
    }
    Ok(id)
}

/// Merges one match date with all its ancestors. Re-merging an identical snapshot changes nothing.
pub fn merge_match_date(
    store: &mut StoreData,
    snapshot: &snap::MatchDate,
    now: DateTime<Utc>,
) -> Result<ScheduleOutcome, MergeError> {
    let url = &snapshot.url;
    snapshot.validate().map_err(invalid(url))?;
    let key = url_key("match date", url).map_err(invalid(url))?;
    let season_snapshot = snapshot
        .season
        .as_ref()
        .ok_or_else(|| MergeError::MissingSeason { url: url.clone() })?;

    let season = merge_season(store, season_snapshot)?;
    let draw = snapshot
        .draw
        .as_ref()
        .map(|draw| merge_draw(store, draw, season))
        .transpose()?;
    let location = snapshot
        .location
        .as_ref()
        .map(|location| merge_location(store, location))
        .transpose()?;
    let home_team = merge_team(store, &snapshot.home_team, season, draw)?;
    let away_team = merge_team(store, &snapshot.away_team, season, draw)?;
    let date_time = snapshot.date_time_utc();

    let fail = || rejected(url, "match date");
    let Some(id) = store.find_match_date(&key, season) else {
        let id = store
            .insert_match_date(NewMatchDate {
                url: key,
                season,
                draw,
                date_time,
                home_team,
                away_team,
                location,
            })
            .map_err(fail())?;
        debug!(%id, "creating match date");
        return Ok(ScheduleOutcome {
            match_date: id,
            change: SlotChange::Created,
        });
    };

    let current = store.match_date(id).map_err(fail())?.clone();
    if draw.is_some() && current.draw != draw {
        store.set_match_draw(id, draw).map_err(fail())?;
    }
    if current.slot() == (date_time, location) {
        return Ok(ScheduleOutcome {
            match_date: id,
            change: SlotChange::Unchanged,
        });
    }

    let last = store.last_change(id).map(|entry| entry.slot());
    let archived = if last == Some(current.slot()) {
        false
    } else {
        if store.has_change(id, current.date_time, current.location) {
            store
                .rearchive_change(id, current.date_time, current.location, now)
                .map_err(fail())?;
        } else {
            store
                .append_change(id, current.date_time, current.location, now)
                .map_err(fail())?;
        }
        info!(%id, from = %current.date_time, to = %date_time, "match date moved, prior slot archived");
        true
    };
    store
        .set_match_slot(id, date_time, location)
        .map_err(fail())?;

    Ok(ScheduleOutcome {
        match_date: id,
        change: SlotChange::Moved { archived },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn snapshot(day: u32, hour: u32, hall: &str) -> snap::MatchDate {
        let season = snap::Season {
            url: "https://league.example/season/abc".into(),
            name: "2024/25".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
        };
        let team = |name: &str, club: &str| snap::Team {
            name: name.into(),
            url: format!("team/{}", name.replace(' ', "-")),
            club: snap::Club { name: club.into() },
        };
        snap::MatchDate {
            url: "https://league.example/season/abc/team-match/17".into(),
            date_time: chrono::FixedOffset::east_opt(2 * 3600)
                .unwrap()
                .with_ymd_and_hms(2024, 10, day, hour, 0, 0)
                .unwrap(),
            home_team: team("BC Olten 2", "BC Olten"),
            away_team: team("BC Bern", "BC Bern"),
            location: Some(snap::Location {
                name: hall.into(),
                address: format!("{hall} street"),
            }),
            season: Some(season),
            draw: Some(snap::Draw {
                url: "draw/nla".into(),
            }),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn first_merge_creates_ancestry() {
        let mut store = StoreData::default();
        let outcome = merge_match_date(&mut store, &snapshot(1, 19, "Hall A"), now()).unwrap();
        assert_eq!(outcome.change, SlotChange::Created);

        let counts = store.counts();
        assert_eq!(counts.seasons, 1);
        assert_eq!(counts.draws, 1);
        assert_eq!(counts.clubs, 2);
        assert_eq!(counts.teams, 2);
        assert_eq!(counts.locations, 1);
        assert_eq!(counts.match_dates, 1);
        assert_eq!(counts.changelog, 0);

        let home = store.find_team("BC Olten 2").unwrap();
        assert_eq!(store.team(home).unwrap().team_nr, 2);
        let away = store.find_team("BC Bern").unwrap();
        assert_eq!(store.team(away).unwrap().team_nr, 1);
        let season = store.find_season("season/abc").unwrap();
        assert_eq!(store.teams_of_season(season), vec![home, away]);
        assert_eq!(store.clubs_of_season(season).len(), 2);
        let draw = store.find_draw("draw/nla", season).unwrap();
        assert_eq!(store.teams_of_draw(draw).len(), 2);
    }

    #[test]
    fn identical_snapshot_is_a_no_op() {
        let mut store = StoreData::default();
        merge_match_date(&mut store, &snapshot(1, 19, "Hall A"), now()).unwrap();
        let json_before = serde_json::to_string(&store).unwrap();
        let outcome = merge_match_date(&mut store, &snapshot(1, 19, "Hall A"), now()).unwrap();
        assert_eq!(outcome.change, SlotChange::Unchanged);
        assert_eq!(serde_json::to_string(&store).unwrap(), json_before);
    }

    #[test]
    fn moved_match_archives_prior_slot_once() {
        let mut store = StoreData::default();
        let created = merge_match_date(&mut store, &snapshot(1, 19, "Hall A"), now()).unwrap();
        let moved = merge_match_date(&mut store, &snapshot(8, 19, "Hall B"), now()).unwrap();
        assert_eq!(moved.change, SlotChange::Moved { archived: true });
        assert_eq!(moved.match_date, created.match_date);

        let history = store.changelog(created.match_date);
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].date_time,
            Utc.with_ymd_and_hms(2024, 10, 1, 17, 0, 0).unwrap()
        );
        assert_eq!(history[0].location, store.find_location("Hall A"));
        assert_eq!(history[0].archived_at, now());
    }

    #[test]
    fn n_distinct_slots_leave_n_minus_one_entries_in_order() {
        let mut store = StoreData::default();
        let slots = [(1, 19, "Hall A"), (8, 19, "Hall B"), (8, 20, "Hall B"), (15, 18, "Hall A")];
        let mut id = None;
        for (day, hour, hall) in slots {
            id = Some(merge_match_date(&mut store, &snapshot(day, hour, hall), now()).unwrap().match_date);
        }
        let id = id.unwrap();
        let history: Vec<_> = store
            .changelog(id)
            .iter()
            .map(|e| (e.date_time, e.location))
            .collect();
        let expected: Vec<_> = slots[..3]
            .iter()
            .map(|(day, hour, hall)| {
                (
                    Utc.with_ymd_and_hms(2024, 10, *day, hour - 2, 0, 0).unwrap(),
                    store.find_location(hall),
                )
            })
            .collect();
        assert_eq!(history, expected);
    }

    #[test]
    fn prior_slot_already_archived_is_not_archived_again() {
        let mut store = StoreData::default();
        let id = merge_match_date(&mut store, &snapshot(1, 19, "Hall A"), now())
            .unwrap()
            .match_date;
        let current = store.match_date(id).unwrap().clone();
        store
            .append_change(id, current.date_time, current.location, now())
            .unwrap();

        let outcome = merge_match_date(&mut store, &snapshot(8, 19, "Hall B"), now()).unwrap();
        assert_eq!(outcome.change, SlotChange::Moved { archived: false });
        assert_eq!(store.changelog(id).len(), 1);
        assert_eq!(store.match_date(id).unwrap().location, store.find_location("Hall B"));
    }

    #[test]
    fn returning_to_an_archived_slot_keeps_keys_unique() {
        let mut store = StoreData::default();
        for (day, hall) in [(1, "Hall A"), (8, "Hall B"), (1, "Hall A"), (8, "Hall B")] {
            merge_match_date(&mut store, &snapshot(day, 19, hall), now()).unwrap();
        }
        let id = store.match_dates()[0].id;
        let halls: Vec<_> = store
            .changelog(id)
            .iter()
            .map(|e| e.location)
            .collect();
        assert_eq!(halls, vec![store.find_location("Hall B"), store.find_location("Hall A")]);
    }

    #[test]
    fn location_address_is_latest_wins() {
        let mut store = StoreData::default();
        merge_match_date(&mut store, &snapshot(1, 19, "Hall A"), now()).unwrap();
        let mut renamed = snapshot(1, 19, "Hall A");
        renamed.location.as_mut().unwrap().address = "New Road 5".into();
        let outcome = merge_match_date(&mut store, &renamed, now()).unwrap();
        assert_eq!(outcome.change, SlotChange::Unchanged);
        let hall = store.find_location("Hall A").unwrap();
        assert_eq!(store.location(hall).unwrap().address, "New Road 5");
        assert_eq!(store.counts().changelog, 0);
    }

    #[test]
    fn draw_is_optional() {
        let mut store = StoreData::default();
        let mut without_draw = snapshot(1, 19, "Hall A");
        without_draw.draw = None;
        let id = merge_match_date(&mut store, &without_draw, now()).unwrap().match_date;
        assert_eq!(store.match_date(id).unwrap().draw, None);
        assert_eq!(store.counts().draws, 0);
    }

    #[test]
    fn match_without_season_is_rejected() {
        let mut store = StoreData::default();
        let mut orphan = snapshot(1, 19, "Hall A");
        orphan.season = None;
        let err = merge_match_date(&mut store, &orphan, now()).unwrap_err();
        assert!(matches!(err, MergeError::MissingSeason { .. }));
        assert_eq!(err.url(), orphan.url);
    }

    #[test]
    fn season_fields_follow_latest_observation() {
        let mut store = StoreData::default();
        let mut season = snapshot(1, 19, "Hall A").season.unwrap();
        let id = merge_season(&mut store, &season).unwrap();
        season.name = "Season 2024/2025".into();
        assert_eq!(merge_season(&mut store, &season).unwrap(), id);
        assert_eq!(store.season(id).unwrap().name, "Season 2024/2025");
        assert_eq!(store.counts().seasons, 1);
    }
}
