//! Session tasks: a body of remote calls run inside one session, retried.
//!
//! A run has two phases. The connect phase tries to open a session up to
//! `tries` times. The session phase then runs the body up to `tries` times
//! on that same session. Both phases pace their retries with one shared
//! [`Backoff`], so waits keep growing across the phases. No wait follows
//! the last failed attempt of a phase.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::remote::{Connector, RemoteSession};
use crate::retry::{pause, Backoff, RetryConfig, Sleeper, TokioSleeper};
use crate::task::{Completion, FailureReason, Task, TaskOutcome};
use nubz_common::Result;

/// Work performed inside an open session.
#[async_trait]
pub trait SessionBody: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Issue the remote calls of this task.
    ///
    /// Transient errors (see `Error::is_transient`) are retried within the
    /// attempt budget; any other error ends the run.
    async fn perform_in_session(&self, session: &mut dyn RemoteSession) -> Result<()>;
}

/// Task running a [`SessionBody`] with connection and session retries.
pub struct SessionTask<B> {
    body: B,
    connector: Arc<dyn Connector>,
    completion: Arc<dyn Completion>,
    retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
}

impl<B: SessionBody> SessionTask<B> {
    /// Create a task with default pacing and the tokio timer.
    pub fn new(body: B, connector: Arc<dyn Connector>, completion: Arc<dyn Completion>) -> Self {
        Self {
            body,
            connector,
            completion,
            retry: RetryConfig::default(),
            sleeper: Arc::new(TokioSleeper),
            cancel: CancellationToken::new(),
        }
    }

    /// Set retry pacing.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the source of waits.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Set the token interrupting retry waits.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Get the body.
    pub fn body(&self) -> &B {
        &self.body
    }

    async fn wait(&self, backoff: &mut Backoff) -> std::result::Result<(), FailureReason> {
        let delay = backoff.next_delay();
        pause(self.sleeper.as_ref(), delay, &self.cancel)
            .await
            .map_err(|_| FailureReason::Cancelled)
    }

    async fn connect(
        &self,
        tries: u32,
        backoff: &mut Backoff,
    ) -> std::result::Result<Box<dyn RemoteSession>, FailureReason> {
        let mut remaining = tries;
        while remaining > 0 {
            if self.cancel.is_cancelled() {
                return Err(FailureReason::Cancelled);
            }
            match self.connector.open_session().await {
                Ok(session) => return Ok(session),
                Err(e) => {
                    remaining -= 1;
                    warn!(task = self.body.name(), remaining, "Opening session failed: {}", e);
                    if remaining > 0 {
                        self.wait(backoff).await?;
                    }
                }
            }
        }
        Err(FailureReason::ConnectionFailed)
    }

    async fn perform(
        &self,
        session: &mut dyn RemoteSession,
        tries: u32,
        backoff: &mut Backoff,
    ) -> std::result::Result<(), FailureReason> {
        let mut remaining = tries;
        while remaining > 0 {
            if self.cancel.is_cancelled() {
                return Err(FailureReason::Cancelled);
            }
            match self.body.perform_in_session(session).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => {
                    remaining -= 1;
                    warn!(task = self.body.name(), remaining, "Action failed: {}", e);
                    if remaining > 0 {
                        self.wait(backoff).await?;
                    }
                }
                Err(e) => {
                    error!(task = self.body.name(), "Action failed permanently: {}", e);
                    return Err(FailureReason::SessionFailed);
                }
            }
        }
        Err(FailureReason::SessionFailed)
    }

    /// One run of both phases, without notifying the completion.
    async fn attempt(&self, tries: u32) -> TaskOutcome {
        let mut backoff = self.retry.backoff();

        let mut session = match self.connect(tries, &mut backoff).await {
            Ok(session) => session,
            Err(reason) => return TaskOutcome::Failed(reason),
        };

        let result = self.perform(session.as_mut(), tries, &mut backoff).await;
        session.close().await;

        match result {
            Ok(()) => TaskOutcome::Succeeded,
            Err(reason) => TaskOutcome::Failed(reason),
        }
    }
}

#[async_trait]
impl<B: SessionBody> Task for SessionTask<B> {
    async fn run(&self, tries: u32) {
        let run_id = Uuid::new_v4();
        info!(task = self.body.name(), %run_id, tries, "Starting run");

        let outcome = self.attempt(tries).await;
        match outcome {
            TaskOutcome::Succeeded => info!(task = self.body.name(), %run_id, "Action successful"),
            TaskOutcome::Failed(reason) => {
                warn!(task = self.body.name(), %run_id, %reason, "Task failed")
            }
        }
        self.completion.complete(outcome);
    }
}
