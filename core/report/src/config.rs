//! Report lifecycle configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration of the report manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory holding report snapshots.
    pub reports_dir: PathBuf,
    /// Seconds between two snapshots of a recording report.
    pub save_interval_secs: u64,
}

impl ReportConfig {
    /// Create a configuration storing snapshots under `reports_dir`.
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
            ..Self::default()
        }
    }

    /// Set the snapshot interval.
    pub fn with_save_interval_secs(mut self, secs: u64) -> Self {
        self.save_interval_secs = secs;
        self
    }

    /// Snapshot interval as a duration, never shorter than one second.
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs.max(1))
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from("reports"),
            save_interval_secs: 15,
        }
    }
}
