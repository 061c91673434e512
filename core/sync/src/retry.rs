//! Retry pacing with a linear backoff.
//!
//! After the i-th failed attempt of a run (counting from 1) the task waits
//! `initial + step * (i - 1)`; with the defaults that is 1s, 3s, 5s, ...

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use nubz_common::{Error, Result};

/// Configuration for retry pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Wait after the first failed attempt, in seconds.
    pub initial_delay_secs: u64,
    /// Growth of the wait after every further failure, in seconds.
    pub delay_step_secs: u64,
}

impl RetryConfig {
    /// Set the first wait.
    pub fn with_initial_delay_secs(mut self, secs: u64) -> Self {
        self.initial_delay_secs = secs;
        self
    }

    /// Set the wait growth.
    pub fn with_delay_step_secs(mut self, secs: u64) -> Self {
        self.delay_step_secs = secs;
        self
    }

    /// Wait after failed attempt number `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let secs = self
            .initial_delay_secs
            .saturating_add(self.delay_step_secs.saturating_mul(u64::from(attempt)));
        Duration::from_secs(secs)
    }

    /// Fresh backoff state for one run.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            config: self.clone(),
            failures: 0,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 1,
            delay_step_secs: 2,
        }
    }
}

/// Backoff state of one run.
///
/// Shared by every phase of the run, so the waits keep growing when a run
/// moves from connecting to working in the session.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    failures: u32,
}

impl Backoff {
    /// Wait to apply after the failure just observed.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.config.delay_for_attempt(self.failures);
        self.failures += 1;
        delay
    }

    /// Failures observed so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Source of waits, replaceable in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// Wait for `duration`, or until `cancel` fires.
///
/// # Errors
/// - `Error::Cancelled` if the token fired first
pub async fn pause(sleeper: &dyn Sleeper, duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled("Retry wait interrupted".to_string())),
        _ = sleeper.sleep(duration) => Ok(()),
    }
}
