use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::{EntityStore, StoreData};

/// Writes `bytes` next to `target` under a temporary name, then renames it into place.
async fn write_atomic(target: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("creating directory {}", parent.display()))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, target).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!(
                "atomically renaming {} -> {}",
                temp_path.display(),
                target.display()
            )
        });
    }
    Ok(())
}

/// The whole entity graph as one JSON document on disk.
#[derive(Debug, Clone)]
pub struct StoreFile {
    path: PathBuf,
}

impl StoreFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the store, or an empty one if the file does not exist yet.
    pub async fn load(&self) -> anyhow::Result<EntityStore> {
        let span = info_span!("store_load", path = %self.path.display());
        async {
            let exists = fs::try_exists(&self.path)
                .await
                .with_context(|| format!("checking store path {}", self.path.display()))?;
            if !exists {
                debug!("no store file yet, starting empty");
                return Ok(EntityStore::new());
            }
            let raw = fs::read(&self.path)
                .await
                .with_context(|| format!("reading store {}", self.path.display()))?;
            let data: StoreData = serde_json::from_slice(&raw)
                .with_context(|| format!("parsing store {}", self.path.display()))?;
            EntityStore::from_data(data)
                .with_context(|| format!("validating store {}", self.path.display()))
        }
        .instrument(span)
        .await
    }

    pub async fn save(&self, data: &StoreData) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec_pretty(data).context("serializing store")?;
        write_atomic(&self.path, &bytes)
            .instrument(info_span!("store_save", path = %self.path.display()))
            .await
    }
}

#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

/// Immutable copies of every raw snapshot bundle, addressed by content hash.
#[derive(Debug, Clone)]
pub struct SnapshotArchive {
    root: PathBuf,
}

impl SnapshotArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn snapshot_relative_path(
        &self,
        fetched_at: DateTime<Utc>,
        source_id: &str,
        content_hash: &str,
    ) -> PathBuf {
        PathBuf::from(fetched_at.format("%Y%m%d").to_string())
            .join(source_id)
            .join(format!("{content_hash}.json"))
    }

    /// Whether these exact bytes were archived for this source and fetch day before.
    pub async fn contains(
        &self,
        fetched_at: DateTime<Utc>,
        source_id: &str,
        bytes: &[u8],
    ) -> anyhow::Result<bool> {
        let relative_path =
            self.snapshot_relative_path(fetched_at, source_id, &Self::sha256_hex(bytes));
        path_exists(&self.root.join(relative_path)).await
    }

    pub async fn store_bytes(
        &self,
        fetched_at: DateTime<Utc>,
        source_id: &str,
        bytes: &[u8],
    ) -> anyhow::Result<StoredSnapshot> {
        let content_hash = Self::sha256_hex(bytes);
        let relative_path = self.snapshot_relative_path(fetched_at, source_id, &content_hash);
        let absolute_path = self.root.join(&relative_path);

        let deduplicated = path_exists(&absolute_path).await?;
        if !deduplicated {
            write_atomic(&absolute_path, bytes).await?;
        }

        Ok(StoredSnapshot {
            content_hash,
            relative_path,
            absolute_path,
            byte_size: bytes.len(),
            deduplicated,
        })
    }
}

async fn path_exists(path: &Path) -> anyhow::Result<bool> {
    fs::try_exists(path)
        .await
        .with_context(|| format!("checking snapshot path {}", path.display()))
}
