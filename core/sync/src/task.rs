//! Units of work run against the remote service, and how they report back.

use async_trait::async_trait;
use std::fmt;
use std::sync::Mutex;
use tokio::sync::oneshot;

/// Why a task gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// No transport could be opened within the attempt budget.
    ConnectionFailed,
    /// The session body kept failing within the attempt budget.
    SessionFailed,
    /// The task was cancelled while waiting to retry.
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ConnectionFailed => write!(f, "connection failed"),
            FailureReason::SessionFailed => write!(f, "session failed"),
            FailureReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Final result of one task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed(FailureReason),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded)
    }
}

/// Receiver of a task's outcome.
///
/// Exactly one of the two methods is called, exactly once, per run.
pub trait Completion: Send + Sync {
    fn on_success(&self);
    fn on_failure(&self, reason: FailureReason);

    /// Deliver `outcome` to the matching method.
    fn complete(&self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Succeeded => self.on_success(),
            TaskOutcome::Failed(reason) => self.on_failure(reason),
        }
    }
}

/// Completion built from two closures.
pub struct FnCompletion<S, F> {
    success: S,
    failure: F,
}

impl<S, F> FnCompletion<S, F>
where
    S: Fn() + Send + Sync,
    F: Fn(FailureReason) + Send + Sync,
{
    pub fn new(success: S, failure: F) -> Self {
        Self { success, failure }
    }
}

impl<S, F> Completion for FnCompletion<S, F>
where
    S: Fn() + Send + Sync,
    F: Fn(FailureReason) + Send + Sync,
{
    fn on_success(&self) {
        (self.success)()
    }

    fn on_failure(&self, reason: FailureReason) {
        (self.failure)(reason)
    }
}

/// Completion forwarding the outcome to a oneshot channel.
pub struct ChannelCompletion {
    sender: Mutex<Option<oneshot::Sender<TaskOutcome>>>,
}

impl ChannelCompletion {
    /// Create the completion and the receiver its outcome arrives on.
    pub fn new() -> (Self, oneshot::Receiver<TaskOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    fn send(&self, outcome: TaskOutcome) {
        let sender = match self.sender.lock() {
            Ok(mut sender) => sender.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(sender) = sender {
            // The receiver may have stopped waiting.
            let _ = sender.send(outcome);
        }
    }
}

impl Completion for ChannelCompletion {
    fn on_success(&self) {
        self.send(TaskOutcome::Succeeded)
    }

    fn on_failure(&self, reason: FailureReason) {
        self.send(TaskOutcome::Failed(reason))
    }
}

/// Unit of work against the remote service.
///
/// A run attempts the work up to `tries` times. It returns nothing; the
/// outcome goes to the task's [`Completion`].
#[async_trait]
pub trait Task: Send + Sync {
    async fn run(&self, tries: u32);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_fn_completion_dispatch() {
        let successes = Arc::new(AtomicU32::new(0));
        let failures = Arc::new(AtomicU32::new(0));
        let (s, f) = (successes.clone(), failures.clone());
        let completion = FnCompletion::new(
            move || {
                s.fetch_add(1, Ordering::SeqCst);
            },
            move |reason| {
                assert_eq!(reason, FailureReason::SessionFailed);
                f.fetch_add(1, Ordering::SeqCst);
            },
        );

        completion.complete(TaskOutcome::Succeeded);
        completion.complete(TaskOutcome::Failed(FailureReason::SessionFailed));
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_channel_completion_delivers_first_outcome() {
        let (completion, rx) = ChannelCompletion::new();
        completion.on_failure(FailureReason::Cancelled);
        completion.on_success();
        assert_eq!(
            rx.await.unwrap(),
            TaskOutcome::Failed(FailureReason::Cancelled)
        );
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (completion, rx) = ChannelCompletion::new();
        drop(rx);
        completion.on_success();
    }
}
