//! Merge engine, conflict scanner and the sync pipeline around them.

use chrono::{DateTime, Utc};
use mada_core::SnapshotRecord;
use mada_storage::{EntityStore, LocationId, SeasonId, StoreData};
use tracing::info_span;

pub mod clashes;
pub mod config;
mod error;
mod pipeline;
pub mod queries;
pub mod results;
pub mod schedule;

pub use clashes::{ClashResult, ConflictScanner, SeasonWindow, Severity};
pub use config::{SourceConfig, SourceRegistry, SyncConfig};
pub use error::MergeError;
pub use pipeline::{run_sync_once_from_env, FailedUnit, MergeTally, SyncPipeline, SyncRunSummary};
pub use results::{merge_team_match_result, resolve_match_date, ResultOutcome, TeamPoints};
pub use schedule::{merge_location, merge_match_date, merge_season, ScheduleOutcome, SlotChange};

pub const CRATE_NAME: &str = "mada-sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Season(SeasonId),
    Location(LocationId),
    MatchDate(ScheduleOutcome),
    TeamMatchResult(ResultOutcome),
}

/// Merges one snapshot record into `store`. `now` stamps archived schedule slots.
pub fn merge_record(
    store: &mut StoreData,
    record: &SnapshotRecord,
    now: DateTime<Utc>,
) -> Result<MergeOutcome, MergeError> {
    let kind = match record {
        SnapshotRecord::Season(_) => "season",
        SnapshotRecord::Location(_) => "location",
        SnapshotRecord::MatchDate(_) => "match_date",
        SnapshotRecord::TeamMatchResult(_) => "team_match_result",
    };
    let span = info_span!("merge_unit", kind, url = record.url());
    let _guard = span.enter();

    match record {
        SnapshotRecord::Season(season) => merge_season(store, season).map(MergeOutcome::Season),
        SnapshotRecord::Location(location) => {
            merge_location(store, location).map(MergeOutcome::Location)
        }
        SnapshotRecord::MatchDate(match_date) => {
            merge_match_date(store, match_date, now).map(MergeOutcome::MatchDate)
        }
        SnapshotRecord::TeamMatchResult(result) => {
            merge_team_match_result(store, result).map(MergeOutcome::TeamMatchResult)
        }
    }
}

/// Runs [`merge_record`] as one unit: committed on success, rolled back on any error.
pub fn merge_in_transaction(
    store: &mut EntityStore,
    record: &SnapshotRecord,
    now: DateTime<Utc>,
) -> Result<MergeOutcome, MergeError> {
    let mut tx = store.transaction();
    let outcome = merge_record(&mut tx, record, now)?;
    tx.commit();
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mada_core::{Location, Season, Side, TeamMatchResult};
    use std::collections::BTreeMap;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 30, 6, 0, 0).unwrap()
    }

    #[test]
    fn records_dispatch_by_kind() {
        let mut store = EntityStore::new();
        let season = SnapshotRecord::Season(Season {
            url: "https://league.example/season/abc".into(),
            name: "2024/25".into(),
            start_date: chrono::NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            end_date: chrono::NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
        });
        let location = SnapshotRecord::Location(Location {
            name: "Hall A".into(),
            address: "Main St 1".into(),
        });
        assert!(matches!(
            merge_in_transaction(&mut store, &season, now()),
            Ok(MergeOutcome::Season(_))
        ));
        assert!(matches!(
            merge_in_transaction(&mut store, &location, now()),
            Ok(MergeOutcome::Location(_))
        ));
        assert_eq!(store.counts().seasons, 1);
        assert_eq!(store.counts().locations, 1);
    }

    #[test]
    fn failed_unit_leaves_store_untouched() {
        let mut store = EntityStore::new();
        let orphan = SnapshotRecord::TeamMatchResult(TeamMatchResult {
            singles: BTreeMap::new(),
            doubles: BTreeMap::new(),
            winner: Side::Home,
            url: "season/abc/team-match/1".into(),
        });
        let err = merge_in_transaction(&mut store, &orphan, now()).unwrap_err();
        assert!(matches!(err, MergeError::MissingMatchDate { .. }));
        assert_eq!(store.counts(), Default::default());
    }
}
