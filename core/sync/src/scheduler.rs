//! Sync scheduling - on-demand requests and periodic report upload.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::task::TaskOutcome;
use nubz_common::{Error, Result};

/// When reports are uploaded without being asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Only on request.
    Manual,
    /// Also every `interval_secs` seconds.
    Periodic { interval_secs: u64 },
}

impl SyncMode {
    /// Check the mode is usable.
    ///
    /// # Errors
    /// - Periodic mode with a zero interval
    pub fn validate(&self) -> Result<()> {
        match self {
            SyncMode::Periodic { interval_secs: 0 } => Err(Error::InvalidInput(
                "Periodic sync interval must be at least one second".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Tick period; a zero interval never ticks.
    fn interval(&self) -> Option<Duration> {
        match self {
            SyncMode::Manual | SyncMode::Periodic { interval_secs: 0 } => None,
            SyncMode::Periodic { interval_secs } => Some(Duration::from_secs(*interval_secs)),
        }
    }
}

/// Work the scheduler can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRequest {
    UploadReports,
    DownloadMap,
    DownloadExhibits,
    /// Stop the scheduler.
    Shutdown,
}

type Envelope = (SyncRequest, oneshot::Sender<TaskOutcome>);

/// Front end for requesting sync work.
pub struct SyncScheduler {
    mode: Arc<RwLock<SyncMode>>,
    request_tx: mpsc::Sender<Envelope>,
}

impl SyncScheduler {
    /// Create a scheduler and the handle that runs it.
    pub fn new(mode: SyncMode) -> (Self, SyncSchedulerHandle) {
        if let Err(e) = mode.validate() {
            warn!("{}, running on request only", e);
        }
        let (request_tx, request_rx) = mpsc::channel(32);
        let mode = Arc::new(RwLock::new(mode));

        let scheduler = Self {
            mode: mode.clone(),
            request_tx,
        };
        let handle = SyncSchedulerHandle { mode, request_rx };
        (scheduler, handle)
    }

    /// Ask for `request` and wait for its outcome.
    ///
    /// # Errors
    /// - The scheduler is not running
    pub async fn request(&self, request: SyncRequest) -> Result<TaskOutcome> {
        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send((request, response_tx))
            .await
            .map_err(|_| Error::InvalidState("Scheduler not running".to_string()))?;
        response_rx
            .await
            .map_err(|_| Error::Cancelled("Scheduler stopped before answering".to_string()))
    }

    /// Upload every ready report.
    pub async fn upload_reports(&self) -> Result<TaskOutcome> {
        self.request(SyncRequest::UploadReports).await
    }

    /// Fetch newer floor maps.
    pub async fn download_map(&self) -> Result<TaskOutcome> {
        self.request(SyncRequest::DownloadMap).await
    }

    /// Fetch changed exhibits.
    pub async fn download_exhibits(&self) -> Result<TaskOutcome> {
        self.request(SyncRequest::DownloadExhibits).await
    }

    /// Change the sync mode; takes effect after the next request or tick.
    pub async fn set_mode(&self, mode: SyncMode) {
        *self.mode.write().await = mode;
    }

    /// Get current sync mode.
    pub async fn get_mode(&self) -> SyncMode {
        self.mode.read().await.clone()
    }

    /// Stop the scheduler.
    pub async fn shutdown(&self) {
        let (response_tx, _) = oneshot::channel();
        let _ = self
            .request_tx
            .send((SyncRequest::Shutdown, response_tx))
            .await;
    }
}

/// Handle for the scheduler background task.
pub struct SyncSchedulerHandle {
    mode: Arc<RwLock<SyncMode>>,
    request_rx: mpsc::Receiver<Envelope>,
}

impl SyncSchedulerHandle {
    /// Run the scheduler until shutdown.
    ///
    /// Spawn this in a tokio task. `sync_fn` performs each request; periodic
    /// ticks issue [`SyncRequest::UploadReports`].
    pub async fn run<F, Fut>(mut self, sync_fn: F)
    where
        F: Fn(SyncRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskOutcome> + Send,
    {
        let mut current = self.mode.read().await.interval();
        let mut ticker = current.map(periodic);

        info!("Sync scheduler started");

        loop {
            tokio::select! {
                received = self.request_rx.recv() => {
                    let Some((request, response_tx)) = received else {
                        break;
                    };
                    if request == SyncRequest::Shutdown {
                        info!("Received shutdown request");
                        break;
                    }
                    debug!(?request, "Processing sync request");
                    let outcome = sync_fn(request).await;
                    let _ = response_tx.send(outcome);
                }

                _ = tick(&mut ticker) => {
                    debug!("Triggering periodic upload");
                    if let TaskOutcome::Failed(reason) = sync_fn(SyncRequest::UploadReports).await {
                        warn!(%reason, "Periodic upload failed");
                    }
                }
            }

            let expected = self.mode.read().await.interval();
            if expected != current {
                current = expected;
                ticker = current.map(periodic);
            }
        }

        info!("Sync scheduler stopped");
    }
}

fn periodic(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes at once; skip it.
    ticker.reset();
    ticker
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
