use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use mada_adapters::source_for;
use mada_core::SnapshotRecord;
use mada_storage::{EntityCounts, SnapshotArchive, StoreFile};
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::clashes::{ClashResult, ConflictScanner};
use crate::config::{load_source_registry, SyncConfig};
use crate::schedule::SlotChange;
use crate::{merge_in_transaction, MergeOutcome};

/// What the merges of one run did to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeTally {
    pub seasons: usize,
    pub locations: usize,
    pub match_dates_created: usize,
    pub match_dates_moved: usize,
    pub match_dates_unchanged: usize,
    pub slots_archived: usize,
    pub results: usize,
}

impl MergeTally {
    pub fn record(&mut self, outcome: &MergeOutcome) {
        match outcome {
            MergeOutcome::Season(_) => self.seasons += 1,
            MergeOutcome::Location(_) => self.locations += 1,
            MergeOutcome::MatchDate(o) => match o.change {
                SlotChange::Created => self.match_dates_created += 1,
                SlotChange::Unchanged => self.match_dates_unchanged += 1,
                SlotChange::Moved { archived } => {
                    self.match_dates_moved += 1;
                    if archived {
                        self.slots_archived += 1;
                    }
                }
            },
            MergeOutcome::TeamMatchResult(_) => self.results += 1,
        }
    }
}

/// A bundle or record that was skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUnit {
    pub source_id: String,
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub timezone: String,
    pub enabled_sources: usize,
    pub bundles: usize,
    pub archived_snapshots: usize,
    pub deduplicated_snapshots: usize,
    pub records: usize,
    pub merged: MergeTally,
    pub failures: Vec<FailedUnit>,
    pub counts: EntityCounts,
    pub clashes: usize,
    pub reports_dir: String,
}

pub struct SyncPipeline {
    config: SyncConfig,
    store_file: StoreFile,
    archive: SnapshotArchive,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Self {
        let store_file = StoreFile::new(config.store_path.clone());
        let archive = SnapshotArchive::new(config.archive_dir.clone());
        Self {
            config,
            store_file,
            archive,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// One full pass: load bundles, merge the ones not archived before (schedule before
    /// results), persist, scan, report.
    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        let run_id = Uuid::new_v4();
        self.run(run_id)
            .instrument(info_span!("sync_run", %run_id))
            .await
    }

    async fn run(&self, run_id: Uuid) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let registry = load_source_registry(&self.config).await?;
        let tz = self.config.resolve_timezone(&registry)?;
        let mut store = self.store_file.load().await?;
        let enabled_sources: Vec<_> = registry.sources.into_iter().filter(|s| s.enabled).collect();

        let mut failures = Vec::new();
        let mut fetched = Vec::new();
        for source in &enabled_sources {
            let adapter = source_for(&source.source_id, self.config.source_dir(source));
            let raws = adapter
                .fetch()
                .await
                .with_context(|| format!("loading snapshots of source {}", source.source_id))?;
            for raw in raws {
                match adapter.parse(&raw) {
                    Ok(bundle) => fetched.push((source.source_id.clone(), raw, bundle)),
                    Err(err) => {
                        warn!(source_id = %source.source_id, error = %err, "skipping unreadable bundle");
                        failures.push(FailedUnit {
                            source_id: source.source_id.clone(),
                            url: raw.path.display().to_string(),
                            error: err.to_string(),
                        });
                    }
                }
            }
        }
        // Observations replay in the order they were fetched, whatever the file names.
        fetched.sort_by_key(|(_, _, bundle)| bundle.fetched_at);

        let mut staged: Vec<(String, SnapshotRecord)> = Vec::new();
        let mut pending = Vec::new();
        let mut deduplicated_snapshots = 0usize;
        let bundles = fetched.len();
        for (source_id, raw, mut bundle) in fetched {
            if self
                .archive
                .contains(bundle.fetched_at, &bundle.source_id, &raw.bytes)
                .await?
            {
                debug!(%source_id, path = %raw.path.display(), "bundle already archived, not merged again");
                deduplicated_snapshots += 1;
                continue;
            }
            staged.extend(
                std::mem::take(&mut bundle.records)
                    .into_iter()
                    .map(|record| (source_id.clone(), record)),
            );
            pending.push((raw, bundle));
        }

        // Results need their match dates; the sort is stable so bundle order survives.
        staged.sort_by_key(|(_, record)| !record.is_schedule());

        let mut merged = MergeTally::default();
        for (source_id, record) in &staged {
            match merge_in_transaction(&mut store, record, Utc::now()) {
                Ok(outcome) => merged.record(&outcome),
                Err(err) => {
                    warn!(%source_id, url = err.url(), error = %err, "merge unit rejected, rolled back");
                    failures.push(FailedUnit {
                        source_id: source_id.clone(),
                        url: err.url().to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }

        self.store_file.save(store.data()).await?;

        // Archived only once their records are durable, so a crashed run merges them again.
        let mut archived_snapshots = 0usize;
        for (raw, bundle) in &pending {
            let stored = self
                .archive
                .store_bytes(bundle.fetched_at, &bundle.source_id, &raw.bytes)
                .await?;
            if !stored.deduplicated {
                archived_snapshots += 1;
            }
        }

        let scanner = ConflictScanner::new(tz);
        let today = Utc::now().with_timezone(&tz).date_naive();
        let clashes = scanner
            .scan_all(store.data(), scanner.season_window(today))
            .context("scanning teams for clashes")?;

        let reports_dir = self.config.reports_dir.join(run_id.to_string());
        let summary = SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            timezone: tz.name().to_string(),
            enabled_sources: enabled_sources.len(),
            bundles,
            archived_snapshots,
            deduplicated_snapshots,
            records: staged.len(),
            merged,
            failures,
            counts: store.counts(),
            clashes: clashes.len(),
            reports_dir: reports_dir.display().to_string(),
        };
        write_reports(&reports_dir, &summary, &clashes).await?;
        info!(
            records = summary.records,
            failures = summary.failures.len(),
            clashes = summary.clashes,
            "sync run finished"
        );
        Ok(summary)
    }
}

async fn write_reports(
    reports_dir: &Path,
    summary: &SyncRunSummary,
    clashes: &[ClashResult],
) -> Result<PathBuf> {
    fs::create_dir_all(reports_dir)
        .await
        .with_context(|| format!("creating {}", reports_dir.display()))?;

    let summary_json = serde_json::to_vec_pretty(summary).context("serializing sync summary")?;
    fs::write(reports_dir.join("sync_summary.json"), summary_json)
        .await
        .context("writing sync_summary.json")?;

    let clashes_json = serde_json::to_vec_pretty(clashes).context("serializing clashes")?;
    fs::write(reports_dir.join("clashes.json"), clashes_json)
        .await
        .context("writing clashes.json")?;

    Ok(reports_dir.to_path_buf())
}

pub async fn run_sync_once_from_env() -> Result<SyncRunSummary> {
    SyncPipeline::new(SyncConfig::from_env()).run_once().await
}
