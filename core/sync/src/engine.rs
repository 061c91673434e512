//! Sync engine running session tasks in the background.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::download::{DownloadExhibits, DownloadMap};
use crate::remote::Connector;
use crate::retry::{RetryConfig, Sleeper, TokioSleeper};
use crate::scheduler::{SyncMode, SyncRequest, SyncScheduler, SyncSchedulerHandle};
use crate::session::{SessionBody, SessionTask};
use crate::task::{ChannelCompletion, Completion, FailureReason, Task, TaskOutcome};
use crate::upload::UploadReports;
use nubz_catalog::{ExhibitsData, MapData};
use nubz_common::Result;
use nubz_report::ReadyReports;

/// Configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Attempt budget of each phase of a task run.
    pub tries: u32,
    /// Pacing between attempts.
    pub retry: RetryConfig,
    /// Sync mode.
    pub sync_mode: SyncMode,
}

impl SyncConfig {
    /// Check the configuration is usable.
    ///
    /// # Errors
    /// - Invalid sync mode
    pub fn validate(&self) -> Result<()> {
        self.sync_mode.validate()
    }

    /// Set the attempt budget.
    pub fn with_tries(mut self, tries: u32) -> Self {
        self.tries = tries;
        self
    }

    /// Set retry pacing.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set sync mode.
    pub fn with_sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tries: 3,
            retry: RetryConfig::default(),
            sync_mode: SyncMode::Manual,
        }
    }
}

/// Runs upload and download tasks against the remote service.
pub struct SyncEngine {
    connector: Arc<dyn Connector>,
    ready: Arc<ReadyReports>,
    maps: Arc<MapData>,
    exhibits: Arc<ExhibitsData>,
    config: SyncConfig,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl SyncEngine {
    /// Create a new sync engine.
    pub fn new(
        connector: Arc<dyn Connector>,
        ready: Arc<ReadyReports>,
        maps: Arc<MapData>,
        exhibits: Arc<ExhibitsData>,
        config: SyncConfig,
    ) -> Self {
        Self {
            connector,
            ready,
            maps,
            exhibits,
            config,
            sleeper: Arc::new(TokioSleeper),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Replace the source of retry waits.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Create a scheduler in the configured mode and the handle that runs it.
    pub fn init_scheduler(&self) -> (SyncScheduler, SyncSchedulerHandle) {
        SyncScheduler::new(self.config.sync_mode.clone())
    }

    fn spawn<B>(&self, body: B, completion: Arc<dyn Completion>) -> JoinHandle<()>
    where
        B: SessionBody + 'static,
    {
        if self.cancel.is_cancelled() {
            debug!(task = body.name(), "Engine stopped, task not started");
            completion.on_failure(FailureReason::Cancelled);
            return tokio::spawn(async {});
        }

        let task = SessionTask::new(body, self.connector.clone(), completion)
            .with_retry(self.config.retry.clone())
            .with_sleeper(self.sleeper.clone())
            .with_cancel(self.cancel.child_token());
        let tries = self.config.tries;
        self.tasks.spawn(async move { task.run(tries).await })
    }

    /// Upload every ready report in the background.
    pub fn upload_reports(&self, completion: Arc<dyn Completion>) -> JoinHandle<()> {
        self.spawn(UploadReports::new(self.ready.clone()), completion)
    }

    /// Fetch newer floor maps in the background.
    pub fn download_map(&self, completion: Arc<dyn Completion>) -> JoinHandle<()> {
        self.spawn(DownloadMap::new(self.maps.clone()), completion)
    }

    /// Fetch changed exhibits in the background.
    pub fn download_exhibits(&self, completion: Arc<dyn Completion>) -> JoinHandle<()> {
        self.spawn(DownloadExhibits::new(self.exhibits.clone()), completion)
    }

    /// Upload every ready report and wait for the outcome.
    pub async fn upload_reports_and_wait(&self) -> TaskOutcome {
        self.perform(SyncRequest::UploadReports).await
    }

    /// Fetch newer floor maps and wait for the outcome.
    pub async fn download_map_and_wait(&self) -> TaskOutcome {
        self.perform(SyncRequest::DownloadMap).await
    }

    /// Fetch changed exhibits and wait for the outcome.
    pub async fn download_exhibits_and_wait(&self) -> TaskOutcome {
        self.perform(SyncRequest::DownloadExhibits).await
    }

    /// Run one scheduler request to completion.
    pub async fn perform(&self, request: SyncRequest) -> TaskOutcome {
        let (completion, outcome) = ChannelCompletion::new();
        let completion: Arc<dyn Completion> = Arc::new(completion);
        match request {
            SyncRequest::UploadReports => self.upload_reports(completion),
            SyncRequest::DownloadMap => self.download_map(completion),
            SyncRequest::DownloadExhibits => self.download_exhibits(completion),
            SyncRequest::Shutdown => return TaskOutcome::Failed(FailureReason::Cancelled),
        };
        outcome
            .await
            .unwrap_or(TaskOutcome::Failed(FailureReason::Cancelled))
    }

    /// Cancel in-flight tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        info!("Sync engine stopped");
    }
}
