//! Snapshot sources: where scraped bundles come from and how they are decoded.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use mada_core::SnapshotBundle;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub const CRATE_NAME: &str = "mada-adapters";

/// Bytes of one bundle file exactly as the scraper left them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSnapshot {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} belongs to source `{found}`, expected `{expected}`")]
    SourceMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
}

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    fn source_id(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<RawSnapshot>, AdapterError>;

    fn parse(&self, raw: &RawSnapshot) -> Result<SnapshotBundle, AdapterError>;
}

/// A directory of `*.json` bundle files, read in file-name order.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    source_id: String,
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(source_id: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            source_id: source_id.into(),
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl SnapshotSource for DirectorySource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch(&self) -> Result<Vec<RawSnapshot>, AdapterError> {
        let io_err = |source: std::io::Error| AdapterError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io_err)?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|source| AdapterError::Io {
                    path: path.clone(),
                    source,
                })?;
            out.push(RawSnapshot { path, bytes });
        }
        Ok(out)
    }

    fn parse(&self, raw: &RawSnapshot) -> Result<SnapshotBundle, AdapterError> {
        let bundle = parse_bundle(&raw.path, &raw.bytes)?;
        if bundle.source_id != self.source_id {
            return Err(AdapterError::SourceMismatch {
                path: raw.path.clone(),
                expected: self.source_id.clone(),
                found: bundle.source_id,
            });
        }
        Ok(bundle)
    }
}

pub fn parse_bundle(path: &Path, bytes: &[u8]) -> Result<SnapshotBundle, AdapterError> {
    serde_json::from_slice(bytes).map_err(|source| AdapterError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_bundle_file(path: impl AsRef<Path>) -> Result<SnapshotBundle> {
    read_json_file(path)
}

fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

pub fn source_for(source_id: &str, dir: impl Into<PathBuf>) -> Box<dyn SnapshotSource> {
    Box::new(DirectorySource::new(source_id, dir))
}
