use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::fs;

pub const REGISTRY_FILE: &str = "mada.yaml";
pub const DEFAULT_TIMEZONE: &str = "Europe/Zurich";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceRegistry {
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Bundle directory; defaults to `<snapshots_dir>/<source_id>`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub store_path: PathBuf,
    pub snapshots_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub timezone: String,
    pub workspace_root: PathBuf,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let path_var = |name: &str, default: &str| {
            std::env::var(name)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(default))
        };
        Self {
            store_path: path_var("MADA_STORE_PATH", "./data/store.json"),
            snapshots_dir: path_var("MADA_SNAPSHOTS_DIR", "./snapshots"),
            archive_dir: path_var("MADA_ARCHIVE_DIR", "./artifacts"),
            reports_dir: path_var("MADA_REPORTS_DIR", "./reports"),
            timezone: std::env::var("MADA_TIMEZONE")
                .unwrap_or_else(|_| DEFAULT_TIMEZONE.to_string()),
            workspace_root: path_var("MADA_WORKSPACE_ROOT", "."),
        }
    }

    /// Default layout rooted at `root`, ignoring the environment.
    pub fn for_workspace(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            store_path: root.join("data").join("store.json"),
            snapshots_dir: root.join("snapshots"),
            archive_dir: root.join("artifacts"),
            reports_dir: root.join("reports"),
            timezone: DEFAULT_TIMEZONE.to_string(),
            workspace_root: root.to_path_buf(),
        }
    }

    pub fn source_dir(&self, source: &SourceConfig) -> PathBuf {
        match &source.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.workspace_root.join(path),
            None => self.snapshots_dir.join(&source.source_id),
        }
    }

    /// The registry's timezone wins over the environment.
    pub fn resolve_timezone(&self, registry: &SourceRegistry) -> Result<Tz> {
        parse_timezone(registry.timezone.as_deref().unwrap_or(&self.timezone))
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|err| anyhow!("unknown timezone `{name}`: {err}"))
}

/// Reads `mada.yaml`; without one, every subdirectory of the snapshots dir is an enabled source.
pub async fn load_source_registry(config: &SyncConfig) -> Result<SourceRegistry> {
    let path = config.workspace_root.join(REGISTRY_FILE);
    if fs::try_exists(&path)
        .await
        .with_context(|| format!("checking {}", path.display()))?
    {
        let text = fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        return serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()));
    }

    let mut sources = Vec::new();
    let dir = &config.snapshots_dir;
    if !fs::try_exists(dir)
        .await
        .with_context(|| format!("checking {}", dir.display()))?
    {
        return Ok(SourceRegistry::default());
    }
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("listing {}", dir.display()))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("listing {}", dir.display()))?
    {
        let is_dir = entry
            .file_type()
            .await
            .with_context(|| format!("inspecting {}", entry.path().display()))?
            .is_dir();
        if is_dir {
            sources.push(SourceConfig {
                source_id: entry.file_name().to_string_lossy().into_owned(),
                enabled: true,
                path: None,
            });
        }
    }
    sources.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    Ok(SourceRegistry {
        timezone: None,
        sources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn registry_yaml_defaults_enabled_and_path() {
        let registry: SourceRegistry = serde_yaml::from_str(
            "timezone: Europe/Berlin\nsources:\n  - source_id: nla\n  - source_id: old\n    enabled: false\n    path: archive/old\n",
        )
        .unwrap();
        assert_eq!(registry.timezone.as_deref(), Some("Europe/Berlin"));
        assert!(registry.sources[0].enabled);
        assert!(!registry.sources[1].enabled);

        let config = SyncConfig::for_workspace("/srv/mada");
        assert_eq!(
            config.source_dir(&registry.sources[0]),
            PathBuf::from("/srv/mada/snapshots/nla")
        );
        assert_eq!(
            config.source_dir(&registry.sources[1]),
            PathBuf::from("/srv/mada/archive/old")
        );
        assert_eq!(
            config.resolve_timezone(&registry).unwrap(),
            chrono_tz::Europe::Berlin
        );
    }

    #[test]
    fn unknown_timezone_is_an_error() {
        assert!(parse_timezone("Mars/Olympus").is_err());
        assert_eq!(parse_timezone(DEFAULT_TIMEZONE).unwrap(), chrono_tz::Europe::Zurich);
    }

    #[tokio::test]
    async fn missing_registry_discovers_snapshot_directories() {
        let dir = tempdir().expect("tempdir");
        let config = SyncConfig::for_workspace(dir.path());
        assert!(load_source_registry(&config).await.unwrap().sources.is_empty());

        std::fs::create_dir_all(config.snapshots_dir.join("zurich")).unwrap();
        std::fs::create_dir_all(config.snapshots_dir.join("bern")).unwrap();
        std::fs::write(config.snapshots_dir.join("stray.json"), "{}").unwrap();
        let registry = load_source_registry(&config).await.unwrap();
        let ids: Vec<_> = registry.sources.iter().map(|s| s.source_id.as_str()).collect();
        assert_eq!(ids, vec!["bern", "zurich"]);
    }

    #[tokio::test]
    async fn registry_file_takes_precedence() {
        let dir = tempdir().expect("tempdir");
        let config = SyncConfig::for_workspace(dir.path());
        std::fs::create_dir_all(config.snapshots_dir.join("zurich")).unwrap();
        std::fs::write(
            dir.path().join(REGISTRY_FILE),
            "sources:\n  - source_id: nla\n",
        )
        .unwrap();
        let registry = load_source_registry(&config).await.unwrap();
        assert_eq!(registry.sources.len(), 1);
        assert_eq!(registry.sources[0].source_id, "nla");
    }
}
