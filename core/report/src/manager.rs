//! Report lifecycle manager.
//!
//! Owns the report being recorded on this device. There is at most one such
//! report at a time. Its lock is the single point where event appends and
//! background snapshots meet; `tokio::sync::Mutex` grants it in FIFO order.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ReportConfig;
use crate::ready::ReadyReports;
use crate::report::{Experiment, Report, ReportEvent};
use crate::saver::BackgroundSaver;
use crate::snapshot;
use nubz_common::{Error, ReportId, ReportState, Result};
use nubz_storage::DurableStore;

struct CurrentReport {
    id: ReportId,
    report: Arc<Mutex<Report>>,
    path: PathBuf,
    saver: BackgroundSaver,
}

/// Manager of the report being recorded.
pub struct ReportManager {
    store: Arc<DurableStore>,
    ready: Arc<ReadyReports>,
    config: ReportConfig,
    experiment: RwLock<Option<Experiment>>,
    current: Mutex<Option<CurrentReport>>,
    /// Savers of finished reports still writing their last snapshot.
    finishing: Mutex<Vec<BackgroundSaver>>,
    cancel: CancellationToken,
}

impl ReportManager {
    /// Create a manager handing finished reports to `ready`.
    pub fn new(store: Arc<DurableStore>, ready: Arc<ReadyReports>, config: ReportConfig) -> Self {
        Self {
            store,
            ready,
            config,
            experiment: RwLock::new(None),
            current: Mutex::new(None),
            finishing: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Set the experiment new reports belong to.
    pub async fn set_experiment(&self, experiment: Experiment) {
        info!(experiment = %experiment.id, "Experiment set");
        *self.experiment.write().await = Some(experiment);
    }

    /// Forget the current experiment.
    pub async fn finish_experiment(&self) {
        *self.experiment.write().await = None;
    }

    /// The current experiment.
    pub async fn experiment(&self) -> Option<Experiment> {
        self.experiment.read().await.clone()
    }

    /// Id of the report being recorded.
    pub async fn current_report_id(&self) -> Option<ReportId> {
        self.current.lock().await.as_ref().map(|slot| slot.id)
    }

    /// Start recording a new report.
    ///
    /// # Postconditions
    /// - The report is registered in the store as RECORDING
    /// - Its background saver is running
    ///
    /// # Errors
    /// - A report is already being recorded
    /// - No experiment is set
    /// - Store fault or I/O failure creating the reports directory
    pub async fn start_new_report(&self) -> Result<ReportId> {
        let mut current = self.current.lock().await;
        if current.is_some() {
            return Err(Error::InvalidState(
                "A report is already being recorded".to_string(),
            ));
        }
        let experiment = self
            .experiment
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::InvalidState("No experiment is set".to_string()))?;

        tokio::fs::create_dir_all(&self.config.reports_dir).await?;

        let id = self.store.next_report_id().await?;
        let report = Report::new(id, &experiment);
        let path = snapshot::report_path(&self.config.reports_dir, id);
        self.store.set_report_file(id, &path).await?;

        let report = Arc::new(Mutex::new(report));
        let saver = BackgroundSaver::spawn(
            report.clone(),
            path.clone(),
            self.config.save_interval(),
            self.cancel.child_token(),
        );
        *current = Some(CurrentReport {
            id,
            report,
            path,
            saver,
        });

        info!(report = %id, experiment = %experiment.id, "Started new report");
        Ok(id)
    }

    /// Append an event to the current report.
    ///
    /// # Errors
    /// - No report is being recorded, or it is already finished
    pub async fn add_event(&self, event: ReportEvent) -> Result<()> {
        let report = self.current_report().await?;
        let mut report = report.lock().await;
        report.add_event(event)
    }

    /// Finish the current report and queue it for upload.
    ///
    /// # Postconditions
    /// - The store records the report as READY_TO_SEND
    /// - The report is in the upload queue and no longer current
    /// - Its saver is woken to write the final snapshot
    ///
    /// # Errors
    /// - No report is being recorded
    /// - Store fault; the report stays current and recording
    pub async fn mark_as_ready(&self) -> Result<ReportId> {
        let mut current = self.current.lock().await;
        let Some(slot) = current.as_ref() else {
            return Err(Error::InvalidState("No report is being recorded".to_string()));
        };

        let mut report = slot.report.lock().await;
        let id = report.id();
        if report.state() != ReportState::Recording {
            return Err(Error::InvalidState(format!(
                "Report {} is {}",
                id,
                report.state()
            )));
        }

        self.store
            .change_report_state(id, ReportState::ReadyToSend)
            .await?;
        report.mark_as_ready()?;
        self.ready.add(Report::clone(&report)).await?;
        drop(report);

        if let Some(slot) = current.take() {
            slot.saver.wake();
            let mut finishing = self.finishing.lock().await;
            finishing.retain(|saver| !saver.is_finished());
            finishing.push(slot.saver);
        }

        info!(report = %id, "Report ready to send");
        Ok(id)
    }

    /// Write a snapshot of the current report now.
    ///
    /// # Errors
    /// - No report is being recorded
    /// - Serialization or I/O failure
    pub async fn flush(&self) -> Result<()> {
        let (report, path) = {
            let current = self.current.lock().await;
            let slot = current
                .as_ref()
                .ok_or_else(|| Error::InvalidState("No report is being recorded".to_string()))?;
            (slot.report.clone(), slot.path.clone())
        };
        let report = report.lock().await;
        snapshot::save(&path, &report).await
    }

    /// Stop every saver after its last snapshot attempt.
    ///
    /// A report still recording stays RECORDING in the store and is
    /// recovered by [`ReadyReports::load`] on the next start.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(slot) = self.current.lock().await.take() {
            slot.saver.shutdown().await;
        }
        let finishing: Vec<_> = self.finishing.lock().await.drain(..).collect();
        for saver in finishing {
            saver.shutdown().await;
        }
        debug!("Report manager stopped");
    }

    async fn current_report(&self) -> Result<Arc<Mutex<Report>>> {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|slot| slot.report.clone())
            .ok_or_else(|| Error::InvalidState("No report is being recorded".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nubz_common::{ExhibitId, ExperimentId};
    use nubz_storage::MemoryBackend;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        store: Arc<DurableStore>,
        ready: Arc<ReadyReports>,
        manager: Arc<ReportManager>,
    }

    async fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(DurableStore::open(Arc::new(MemoryBackend::new())).await.unwrap());
        let ready = Arc::new(ReadyReports::new(store.clone()));
        let config = ReportConfig::new(temp.path().join("reports"));
        let manager = Arc::new(ReportManager::new(store.clone(), ready.clone(), config));
        manager
            .set_experiment(Experiment::new(ExperimentId::new(2), "walk"))
            .await;
        Fixture {
            _temp: temp,
            store,
            ready,
            manager,
        }
    }

    #[tokio::test]
    async fn test_report_lifecycle() {
        let f = fixture().await;
        let id = f.manager.start_new_report().await.unwrap();
        assert_eq!(id, ReportId::new(1));

        let record = f.store.get_report_record(id).await.unwrap().unwrap();
        assert_eq!(record.state, ReportState::Recording);

        f.manager
            .add_event(ReportEvent::new(30, vec!["listen".into()]).at_exhibit(ExhibitId::new(4)))
            .await
            .unwrap();
        assert_eq!(f.manager.mark_as_ready().await.unwrap(), id);

        let record = f.store.get_report_record(id).await.unwrap().unwrap();
        assert_eq!(record.state, ReportState::ReadyToSend);
        assert_eq!(f.ready.len().await, 1);
        assert!(f.manager.current_report_id().await.is_none());

        f.manager.shutdown().await;
        let saved = snapshot::load(&record.file).await.unwrap();
        assert_eq!(saved.state(), ReportState::ReadyToSend);
        assert_eq!(saved.history().len(), 1);
    }

    #[tokio::test]
    async fn test_add_event_without_report_fails() {
        let f = fixture().await;
        let result = f.manager.add_event(ReportEvent::new(1, Vec::new())).await;
        assert!(matches!(result, Err(Error::InvalidState(_))));

        f.manager.start_new_report().await.unwrap();
        f.manager.mark_as_ready().await.unwrap();
        let result = f.manager.add_event(ReportEvent::new(1, Vec::new())).await;
        assert!(matches!(result, Err(Error::InvalidState(_))));
        f.manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_one_current_report_at_a_time() {
        let f = fixture().await;
        f.manager.start_new_report().await.unwrap();
        assert!(matches!(
            f.manager.start_new_report().await,
            Err(Error::InvalidState(_))
        ));
        f.manager.mark_as_ready().await.unwrap();
        assert_eq!(
            f.manager.start_new_report().await.unwrap(),
            ReportId::new(2)
        );
        f.manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_requires_experiment() {
        let f = fixture().await;
        f.manager.finish_experiment().await;
        assert!(matches!(
            f.manager.start_new_report().await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_leaves_recording_report_recoverable() {
        let f = fixture().await;
        let id = f.manager.start_new_report().await.unwrap();
        f.manager
            .add_event(ReportEvent::new(5, vec!["look".into()]))
            .await
            .unwrap();
        f.manager.shutdown().await;

        let recovered = ReadyReports::load(f.store.clone()).await.unwrap();
        let all = recovered.all_ready().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].report.id(), id);
        assert_eq!(all[0].report.history().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_appends_never_tear_snapshots() {
        let f = fixture().await;
        let id = f.manager.start_new_report().await.unwrap();
        let path = f.store.get_report_record(id).await.unwrap().unwrap().file;

        let mut writers = Vec::new();
        for writer in 0..4u32 {
            let manager = f.manager.clone();
            writers.push(tokio::spawn(async move {
                for step in 0..25u32 {
                    let event = ReportEvent::new(step, vec![format!("w{}", writer)]);
                    manager.add_event(event).await.unwrap();
                }
            }));
        }

        for _ in 0..20 {
            f.manager.flush().await.unwrap();
            let saved = snapshot::load(&path).await.unwrap();
            // Every writer's events appear as a gap-free prefix of its own sequence.
            for writer in 0..4u32 {
                let tag = format!("w{}", writer);
                let steps: Vec<u32> = saved
                    .history()
                    .iter()
                    .filter(|e| e.actions[0] == tag)
                    .map(|e| e.duration_secs)
                    .collect();
                assert_eq!(steps, (0..steps.len() as u32).collect::<Vec<_>>());
            }
            tokio::task::yield_now().await;
        }

        for writer in writers {
            writer.await.unwrap();
        }
        f.manager.flush().await.unwrap();
        assert_eq!(snapshot::load(&path).await.unwrap().history().len(), 100);
        f.manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_background_saver_races_appends_without_tearing() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(DurableStore::open(Arc::new(MemoryBackend::new())).await.unwrap());
        let ready = Arc::new(ReadyReports::new(store.clone()));
        let config = ReportConfig::new(temp.path().join("reports")).with_save_interval_secs(1);
        let manager = Arc::new(ReportManager::new(store.clone(), ready, config));
        manager
            .set_experiment(Experiment::new(ExperimentId::new(2), "walk"))
            .await;
        let id = manager.start_new_report().await.unwrap();
        let path = store.get_report_record(id).await.unwrap().unwrap().file;

        let mut writers = Vec::new();
        for writer in 0..4u32 {
            let manager = manager.clone();
            writers.push(tokio::spawn(async move {
                for step in 0..25u32 {
                    let event = ReportEvent::new(step, vec![format!("w{}", writer)]);
                    manager.add_event(event).await.unwrap();
                    tokio::time::sleep(Duration::from_millis(60)).await;
                }
            }));
        }

        // Only the saver writes the file here.
        let mut partial_seen = false;
        while !writers.iter().all(|w| w.is_finished()) {
            if let Ok(saved) = snapshot::load(&path).await {
                let len = saved.history().len();
                partial_seen |= len > 0 && len < 100;
                for writer in 0..4u32 {
                    let tag = format!("w{}", writer);
                    let steps: Vec<u32> = saved
                        .history()
                        .iter()
                        .filter(|e| e.actions[0] == tag)
                        .map(|e| e.duration_secs)
                        .collect();
                    assert_eq!(steps, (0..steps.len() as u32).collect::<Vec<_>>());
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        for writer in writers {
            writer.await.unwrap();
        }
        assert!(partial_seen);

        manager.mark_as_ready().await.unwrap();
        manager.shutdown().await;
        let saved = snapshot::load(&path).await.unwrap();
        assert_eq!(saved.history().len(), 100);
        assert_eq!(saved.state(), ReportState::ReadyToSend);
    }
}
