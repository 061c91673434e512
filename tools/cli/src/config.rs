//! Configuration of a nubz data directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use nubz_report::ReportConfig;
use nubz_storage::StoreConfig;
use nubz_sync::SyncConfig;

/// Name of the configuration file inside the data directory.
pub const CONFIG_FILE: &str = "nubz.json";

/// Everything the CLI needs to open a data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NubzConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    /// Directory holding the floor map files.
    pub maps_dir: PathBuf,
}

impl NubzConfig {
    /// Default layout rooted at `data_dir`.
    pub fn default_for(data_dir: &Path) -> Self {
        Self {
            store: StoreConfig::file(data_dir.join("store.json").to_string_lossy()),
            report: ReportConfig::new(data_dir.join("reports")),
            sync: SyncConfig::default(),
            maps_dir: data_dir.join("maps"),
        }
    }

    /// Load `nubz.json` from `data_dir`, falling back to the default layout.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let config: Self = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Invalid configuration in {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default_for(data_dir),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        config
            .sync
            .validate()
            .with_context(|| format!("Invalid sync settings in {}", path.display()))?;
        Ok(config)
    }

    /// Write this configuration to `data_dir`.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        nubz_storage::write_atomic(&data_dir.join(CONFIG_FILE), &json)
            .await
            .context("Failed to write configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nubz_sync::SyncMode;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = NubzConfig::load(temp.path()).await.unwrap();

        assert_eq!(config.store.backend, "file");
        assert_eq!(config.maps_dir, temp.path().join("maps"));
        assert_eq!(config.report.save_interval_secs, 15);
        assert_eq!(config.sync.tries, 3);
    }

    #[tokio::test]
    async fn test_saved_config_is_loaded() {
        let temp = TempDir::new().unwrap();
        let mut config = NubzConfig::default_for(temp.path());
        config.sync = config.sync.with_tries(7);
        config.save(temp.path()).await.unwrap();

        let loaded = NubzConfig::load(temp.path()).await.unwrap();
        assert_eq!(loaded.sync.tries, 7);
        assert_eq!(loaded.report.reports_dir, temp.path().join("reports"));
    }

    #[tokio::test]
    async fn test_zero_sync_interval_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut config = NubzConfig::default_for(temp.path());
        config.sync = config
            .sync
            .with_sync_mode(SyncMode::Periodic { interval_secs: 0 });
        config.save(temp.path()).await.unwrap();

        assert!(NubzConfig::load(temp.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        tokio::fs::write(temp.path().join(CONFIG_FILE), b"{ not json")
            .await
            .unwrap();
        assert!(NubzConfig::load(temp.path()).await.is_err());
    }
}
