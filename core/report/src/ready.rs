//! Finished reports waiting for upload.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::report::Report;
use crate::snapshot;
use nubz_common::{Error, ReportId, ReportState, Result, ServerReportId};
use nubz_storage::{DurableStore, ReportRecord};

/// Snapshot of a pending report together with its remote id, if known.
#[derive(Debug, Clone)]
pub struct ReadyReport {
    pub report: Report,
    pub server_id: Option<ServerReportId>,
}

struct Entry {
    report: Report,
    server_id: Option<ServerReportId>,
}

/// Upload queue of finished reports.
///
/// The store is the authority on each report's state; this set mirrors the
/// READY_TO_SEND records and drops a report once it is marked sent.
pub struct ReadyReports {
    store: Arc<DurableStore>,
    pending: Mutex<BTreeMap<ReportId, Entry>>,
    upload: Mutex<()>,
}

impl ReadyReports {
    /// Create an empty queue.
    pub fn new(store: Arc<DurableStore>) -> Self {
        Self {
            store,
            pending: Mutex::new(BTreeMap::new()),
            upload: Mutex::new(()),
        }
    }

    /// Build the queue from the store.
    ///
    /// Reports still RECORDING were left behind by a process that stopped
    /// mid-walk; they are finished here and queued too. Reports whose
    /// snapshot cannot be read are logged and skipped.
    ///
    /// # Errors
    /// - Store fault
    pub async fn load(store: Arc<DurableStore>) -> Result<Self> {
        let ready = Self::new(store.clone());
        let mut pending = BTreeMap::new();

        for record in store.reports_in_state(ReportState::ReadyToSend).await? {
            if let Some(report) = read_record(&record).await {
                pending.insert(record.id, Entry {
                    report: finish(report),
                    server_id: record.server_id,
                });
            }
        }

        for record in store.reports_in_state(ReportState::Recording).await? {
            let Some(report) = read_record(&record).await else {
                continue;
            };
            let report = finish(report);
            if let Err(e) = snapshot::save(&record.file, &report).await {
                warn!(report = %record.id, "Cannot save recovered report: {}", e);
                continue;
            }
            store
                .change_report_state(record.id, ReportState::ReadyToSend)
                .await?;
            info!(report = %record.id, "Recovered unfinished report");
            pending.insert(record.id, Entry {
                report,
                server_id: record.server_id,
            });
        }

        *ready.pending.lock().await = pending;
        Ok(ready)
    }

    /// Queue a finished report.
    ///
    /// # Errors
    /// - Report is not READY_TO_SEND
    pub async fn add(&self, report: Report) -> Result<()> {
        if report.state() != ReportState::ReadyToSend {
            return Err(Error::InvalidState(format!(
                "Report {} is {}, only finished reports can be queued",
                report.id(),
                report.state()
            )));
        }
        self.pending.lock().await.insert(report.id(), Entry {
            report,
            server_id: None,
        });
        Ok(())
    }

    /// Take the right to upload the queue.
    ///
    /// Uploaders hold the guard for a whole batch, so a report is never
    /// given two remote ids by overlapping uploads.
    pub async fn lock_upload(&self) -> MutexGuard<'_, ()> {
        self.upload.lock().await
    }

    /// Every queued report, ordered by id.
    pub async fn all_ready(&self) -> Vec<ReadyReport> {
        self.pending
            .lock()
            .await
            .values()
            .map(|entry| ReadyReport {
                report: entry.report.clone(),
                server_id: entry.server_id,
            })
            .collect()
    }

    /// Record the remote id of a queued report, in the store first.
    ///
    /// # Errors
    /// - Report not queued
    /// - Store fault, or a different remote id already recorded
    pub async fn set_server_id(&self, id: ReportId, server_id: ServerReportId) -> Result<()> {
        let mut pending = self.pending.lock().await;
        let entry = pending
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Report {} is not pending", id)))?;
        self.store.set_report_server_id(id, server_id).await?;
        entry.server_id = Some(server_id);
        Ok(())
    }

    /// Record that the remote service acknowledged a report and drop it.
    ///
    /// # Errors
    /// - Report not queued
    /// - Store fault; the report stays queued
    pub async fn mark_as_sent(&self, id: ReportId) -> Result<()> {
        let mut pending = self.pending.lock().await;
        let entry = pending
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Report {} is not pending", id)))?;
        self.store
            .change_report_state(id, ReportState::Sent)
            .await?;
        entry.report.mark_as_sent()?;
        pending.remove(&id);
        info!(report = %id, "Report sent");
        Ok(())
    }

    /// Number of queued reports.
    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Check if nothing is queued.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

async fn read_record(record: &ReportRecord) -> Option<Report> {
    match snapshot::load(&record.file).await {
        Ok(report) => Some(report),
        Err(e) => {
            warn!(report = %record.id, "Skipping unreadable report {}: {}", record.file.display(), e);
            None
        }
    }
}

/// Bring a snapshot taken before the report was finished up to date.
fn finish(mut report: Report) -> Report {
    if report.state() == ReportState::Recording {
        // Recording -> ReadyToSend is always allowed.
        let _ = report.mark_as_ready();
    }
    report
}
