use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use mada_core::{
    Category, Club, DoublesPair, DoublesResult, Location, MatchDate, Player, Season, Set, Side,
    SinglesResult, SnapshotBundle, SnapshotRecord, Team, TeamMatchResult,
};
use mada_storage::{EntityStore, StoreFile, WinningTeam};
use mada_sync::{merge_in_transaction, resolve_match_date, MergeTally, SyncConfig, SyncPipeline};

const MATCH_URL: &str = "https://league.example/season/abc/team-match/17";

fn season() -> Season {
    Season {
        url: "https://league.example/season/abc".into(),
        name: "2024/25".into(),
        start_date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
    }
}

fn team(name: &str, nr: u32) -> Team {
    Team {
        name: name.into(),
        url: format!("https://league.example/team/{nr}"),
        club: Club {
            name: name.trim_end_matches(char::is_numeric).trim().into(),
        },
    }
}

fn scheduled(day: u32, hall: &str) -> SnapshotRecord {
    SnapshotRecord::MatchDate(MatchDate {
        url: MATCH_URL.into(),
        date_time: FixedOffset::east_opt(7200)
            .unwrap()
            .with_ymd_and_hms(2024, 10, day, 19, 0, 0)
            .unwrap(),
        home_team: team("BC Olten 2", 5),
        away_team: team("BC Bern", 9),
        location: Some(Location {
            name: hall.into(),
            address: format!("{hall} road 1"),
        }),
        season: Some(season()),
        draw: None,
    })
}

fn player(n: u32) -> Player {
    Player {
        name: format!("Player {n}"),
        url: format!("https://league.example/player/{n}"),
    }
}

/// Full seven-category result where home takes `home_wins` of the categories.
fn played(home_wins: usize) -> SnapshotRecord {
    let winner = |idx: usize| if idx < home_wins { Side::Home } else { Side::Away };
    let mut singles = BTreeMap::new();
    for (idx, category) in Category::singles().into_iter().enumerate() {
        let n = idx as u32;
        singles.insert(
            category,
            SinglesResult {
                home_player: Some(player(n)),
                away_player: Some(player(n + 50)),
                set_1: Some(Set::new(21, 12)),
                set_2: Some(Set::new(12, 21)),
                set_3: Some(Set::new(21, 19)),
                winner: winner(idx),
                retired: Side::Neither,
            },
        );
    }
    let mut doubles = BTreeMap::new();
    for (idx, category) in [Category::Hd1, Category::Dd1, Category::Mx1]
        .into_iter()
        .enumerate()
    {
        let n = 10 + idx as u32 * 2;
        doubles.insert(
            category,
            DoublesResult {
                home_pair: Some(DoublesPair {
                    first: player(n),
                    second: player(n + 1),
                }),
                away_pair: Some(DoublesPair {
                    first: player(n + 50),
                    second: player(n + 51),
                }),
                set_1: Some(Set::new(21, 17)),
                set_2: Some(Set::new(21, 17)),
                set_3: None,
                winner: winner(4 + idx),
                retired: Side::Neither,
            },
        );
    }
    SnapshotRecord::TeamMatchResult(TeamMatchResult {
        singles,
        doubles,
        winner: Side::Home,
        url: MATCH_URL.into(),
    })
}

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, day, 6, 0, 0).unwrap()
}

#[test]
fn rescheduled_match_keeps_its_previous_slot() {
    let mut store = EntityStore::new();
    merge_in_transaction(&mut store, &scheduled(1, "Hall A"), at(20)).expect("first slot");
    merge_in_transaction(&mut store, &scheduled(8, "Hall B"), at(27)).expect("moved slot");

    let id = resolve_match_date(store.data(), MATCH_URL).expect("match date");
    let current = store.match_date(id).unwrap();
    assert_eq!(current.date_time, Utc.with_ymd_and_hms(2024, 10, 8, 17, 0, 0).unwrap());
    assert_eq!(current.location, store.find_location("Hall B"));

    let history = store.changelog(id);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].date_time, Utc.with_ymd_and_hms(2024, 10, 1, 17, 0, 0).unwrap());
    assert_eq!(history[0].location, store.find_location("Hall A"));
    assert_eq!(history[0].archived_at, at(27));
}

#[test]
fn seven_category_result_is_scored_two_to_one() {
    let mut store = EntityStore::new();
    merge_in_transaction(&mut store, &scheduled(1, "Hall A"), at(20)).expect("schedule");
    merge_in_transaction(&mut store, &played(5), at(20)).expect("result");

    let id = resolve_match_date(store.data(), MATCH_URL).expect("match date");
    let result_id = store.find_match_result(id).expect("match result");
    let result = store.match_result(result_id).unwrap();
    assert_eq!((result.home_points, result.away_points), (2, 1));
    assert_eq!(result.winner, Some(WinningTeam::Home));
    assert!(!result.walkover);
    assert_eq!(store.counts().singles_results, 4);
    assert_eq!(store.counts().doubles_results, 3);
}

fn write_bundle(dir: &std::path::Path, file: &str, fetched_day: u32, records: Vec<SnapshotRecord>) {
    let bundle = SnapshotBundle {
        source_id: "interclub".into(),
        fetched_at: at(fetched_day),
        records,
    };
    std::fs::write(dir.join(file), serde_json::to_vec_pretty(&bundle).unwrap()).unwrap();
}

#[tokio::test]
async fn pipeline_merges_bundles_skips_bad_units_and_persists() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let config = SyncConfig::for_workspace(workspace.path());
    let source_dir = config.snapshots_dir.join("interclub");
    std::fs::create_dir_all(&source_dir).unwrap();

    // The result sits in the first file; schedule records still merge before it.
    write_bundle(
        &source_dir,
        "001.json",
        20,
        vec![played(4), SnapshotRecord::Season(season()), scheduled(1, "Hall A")],
    );
    write_bundle(&source_dir, "002.json", 27, vec![scheduled(8, "Hall B")]);
    let orphan = SnapshotRecord::TeamMatchResult(TeamMatchResult {
        singles: BTreeMap::new(),
        doubles: BTreeMap::new(),
        winner: Side::Away,
        url: "https://league.example/season/abc/team-match/99".into(),
    });
    write_bundle(&source_dir, "003.json", 28, vec![orphan]);
    std::fs::write(source_dir.join("004.json"), "{ not json").unwrap();

    let pipeline = SyncPipeline::new(config.clone());
    let summary = pipeline.run_once().await.expect("sync run");
    assert_eq!(summary.enabled_sources, 1);
    assert_eq!(summary.bundles, 3);
    assert_eq!(summary.archived_snapshots, 3);
    assert_eq!(summary.records, 5);
    assert_eq!(summary.merged.match_dates_created, 1);
    assert_eq!(summary.merged.match_dates_moved, 1);
    assert_eq!(summary.merged.slots_archived, 1);
    assert_eq!(summary.merged.results, 1);
    assert_eq!(summary.failures.len(), 2);
    assert!(summary.failures.iter().any(|f| f.url.ends_with("004.json")));
    assert!(summary.failures.iter().any(|f| f.url.ends_with("team-match/99")));
    assert_eq!(summary.counts.match_dates, 1);
    assert_eq!(summary.counts.changelog, 1);
    assert_eq!(summary.counts.match_results, 1);

    let reports = std::path::PathBuf::from(&summary.reports_dir);
    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(reports.join("sync_summary.json")).unwrap()).unwrap();
    assert_eq!(written["run_id"], summary.run_id.to_string());

    let reloaded = StoreFile::new(config.store_path.clone()).load().await.expect("reload");
    assert_eq!(reloaded.counts(), summary.counts);

    let again = pipeline.run_once().await.expect("second run");
    assert_eq!(again.bundles, 3);
    assert_eq!(again.deduplicated_snapshots, 3);
    assert_eq!(again.archived_snapshots, 0);
    assert_eq!(again.records, 0);
    assert_eq!(again.merged, MergeTally::default());
    assert_eq!(again.counts, summary.counts);

    let store = StoreFile::new(config.store_path.clone()).load().await.expect("reload");
    let id = resolve_match_date(store.data(), MATCH_URL).expect("match date");
    let history = store.changelog(id);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].date_time, Utc.with_ymd_and_hms(2024, 10, 1, 17, 0, 0).unwrap());
    assert_eq!(history[0].location, store.find_location("Hall A"));
}

#[tokio::test]
async fn pipeline_merges_bundles_in_fetch_order() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let config = SyncConfig::for_workspace(workspace.path());
    let source_dir = config.snapshots_dir.join("interclub");
    std::fs::create_dir_all(&source_dir).unwrap();

    // File names sort the later observation first.
    write_bundle(&source_dir, "a.json", 27, vec![scheduled(8, "Hall B")]);
    write_bundle(&source_dir, "b.json", 20, vec![scheduled(1, "Hall A")]);

    let summary = SyncPipeline::new(config.clone()).run_once().await.expect("sync run");
    assert_eq!(summary.merged.match_dates_created, 1);
    assert_eq!(summary.merged.match_dates_moved, 1);

    let store = StoreFile::new(config.store_path.clone()).load().await.expect("reload");
    let id = resolve_match_date(store.data(), MATCH_URL).expect("match date");
    let current = store.match_date(id).unwrap();
    assert_eq!(current.date_time, Utc.with_ymd_and_hms(2024, 10, 8, 17, 0, 0).unwrap());
    assert_eq!(current.location, store.find_location("Hall B"));
    let history = store.changelog(id);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].date_time, Utc.with_ymd_and_hms(2024, 10, 1, 17, 0, 0).unwrap());
}
