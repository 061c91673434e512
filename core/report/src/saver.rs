//! Background persistence of a report.
//!
//! Each report gets one saver task. The task takes the report lock, writes a
//! snapshot and releases the lock, then waits for the next round. It stops
//! once a snapshot of a finished report is on disk, or when the report has
//! already been sent.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::report::Report;
use crate::snapshot;
use nubz_common::ReportState;

/// Handle on a running saver task.
pub struct BackgroundSaver {
    wake: Arc<Notify>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl BackgroundSaver {
    /// Spawn a saver writing `report` to `path` every `interval`.
    ///
    /// `cancel` stops the saver after one last snapshot attempt.
    pub fn spawn(
        report: Arc<Mutex<Report>>,
        path: PathBuf,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let wake = Arc::new(Notify::new());
        let task = tokio::spawn(run(report, path, interval, wake.clone(), cancel.clone()));
        Self { wake, cancel, task }
    }

    /// Cut the current wait short.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Whether the saver task has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the saver and wait for it.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Report saver ended abnormally: {}", e);
        }
    }
}

/// How a wait between two rounds ended.
enum Wake {
    Tick,
    Cancelled,
}

async fn wait(interval: Duration, wake: &Notify, cancel: &CancellationToken) -> Wake {
    tokio::select! {
        _ = cancel.cancelled() => Wake::Cancelled,
        _ = wake.notified() => Wake::Tick,
        _ = tokio::time::sleep(interval) => Wake::Tick,
    }
}

/// Write one snapshot under the report lock.
///
/// Returns the state the snapshot captured, or `None` if writing failed.
async fn save_once(report: &Mutex<Report>, path: &Path) -> Option<ReportState> {
    let report = report.lock().await;
    match snapshot::save(path, &report).await {
        Ok(()) => Some(report.state()),
        Err(e) => {
            warn!(report = %report.id(), "Saving report failed: {}", e);
            None
        }
    }
}

async fn run(
    report: Arc<Mutex<Report>>,
    path: PathBuf,
    interval: Duration,
    wake: Arc<Notify>,
    cancel: CancellationToken,
) {
    let id = report.lock().await.id();
    debug!(report = %id, "Report saver started");

    loop {
        if report.lock().await.state() == ReportState::Sent {
            break;
        }

        if save_once(&report, &path).await == Some(ReportState::ReadyToSend) {
            break;
        }

        if let Wake::Cancelled = wait(interval, &wake, &cancel).await {
            save_once(&report, &path).await;
            break;
        }
    }

    info!(report = %id, "Saving report stopped");
}
