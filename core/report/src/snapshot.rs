//! Report snapshots on disk.
//!
//! A report lives in `report<id>` inside the reports directory. Snapshots
//! are staged in `TMP<id>` next to it and renamed over it, so a reader (or a
//! restarted process) sees either the previous or the new snapshot.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::report::Report;
use nubz_common::{ReportId, Result};
use nubz_storage::write_atomic_via;

const FILE_PREFIX: &str = "report";
const TEMP_PREFIX: &str = "TMP";

/// Snapshot location of report `id` under `dir`.
pub fn report_path(dir: &Path, id: ReportId) -> PathBuf {
    dir.join(format!("{}{}", FILE_PREFIX, id))
}

/// Write a snapshot of `report` to `path`.
///
/// # Errors
/// - Serialization or I/O failure; the previous snapshot is left intact
pub async fn save(path: &Path, report: &Report) -> Result<()> {
    let data = serde_json::to_vec(report)?;
    let temp = path.with_file_name(format!("{}{}", TEMP_PREFIX, report.id()));
    write_atomic_via(&temp, path, &data).await?;
    debug!(report = %report.id(), "Saved report snapshot to {}", path.display());
    Ok(())
}

/// Read the snapshot at `path`.
///
/// # Errors
/// - File missing, unreadable, or not a report snapshot
pub async fn load(path: &Path) -> Result<Report> {
    let data = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&data)?)
}
