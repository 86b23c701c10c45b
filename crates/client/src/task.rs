//! Waiting for server-side tasks
//!
//! Every mutating call returns a [`TaskHandle`]; [`TaskMonitor::wait`] polls
//! its status until the task stops. Polling starts immediately, then backs
//! off per the configured [`BackoffPolicy`]. Cancellation aborts the wait at
//! once, including while a status request is in flight.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stratus_resilience::{BackoffPolicy, CancellationToken, sleep_or_cancel};
use tracing::{debug, info, instrument, warn};

use crate::error::{ClientError, ClientResult};
use crate::model::{TaskHandle, TaskStatus};

/// Reports task status
#[async_trait]
pub trait TaskStatusSource: Send + Sync {
    /// Current status of the task
    async fn task_status(&self, handle: &TaskHandle) -> ClientResult<TaskStatus>;
}

#[async_trait]
impl<T: TaskStatusSource + ?Sized> TaskStatusSource for Arc<T> {
    async fn task_status(&self, handle: &TaskHandle) -> ClientResult<TaskStatus> {
        (**self).task_status(handle).await
    }
}

/// Observer for task progress
///
/// Callbacks run inline on the waiting task and must not block. They cannot
/// influence polling cadence or the outcome.
pub trait TaskProgress: Send + Sync {
    /// Called after every successful poll; `attempt` starts at 0
    fn on_poll(&self, _handle: &TaskHandle, _status: &TaskStatus, _attempt: u32) {}

    /// Called once with the final outcome
    fn on_finish(&self, _handle: &TaskHandle, _outcome: &ClientResult<()>) {}
}

/// [`TaskProgress`] that emits tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl TaskProgress for LogProgress {
    fn on_poll(&self, handle: &TaskHandle, status: &TaskStatus, attempt: u32) {
        debug!(upid = %handle, ?status, attempt, "task polled");
    }

    fn on_finish(&self, handle: &TaskHandle, outcome: &ClientResult<()>) {
        match outcome {
            Ok(()) => info!(upid = %handle, "task finished"),
            Err(err) if err.is_cancelled() => info!(upid = %handle, "task wait cancelled"),
            Err(err) => warn!(upid = %handle, error = %err, "task did not succeed"),
        }
    }
}

/// Polls tasks to completion
#[derive(Clone, Default)]
pub struct TaskMonitor {
    policy: BackoffPolicy,
    timeout: Option<Duration>,
    progress: Option<Arc<dyn TaskProgress>>,
}

impl std::fmt::Debug for TaskMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskMonitor")
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl TaskMonitor {
    /// Monitor polling per `policy`, without a deadline
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            timeout: None,
            progress: None,
        }
    }

    /// Give up with [`ClientError::TaskTimeout`] after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a progress observer
    pub fn with_progress(mut self, progress: Arc<dyn TaskProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Polling policy
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Wait until the task stops
    ///
    /// `Ok` only for `stopped` with exit status `OK`. Any other exit string
    /// is returned in [`ClientError::TaskFailed`]. Status request errors end
    /// the wait as they are.
    #[instrument(skip(self, source, handle, cancel), fields(upid = %handle))]
    pub async fn wait<S>(&self, source: &S, handle: &TaskHandle, cancel: &CancellationToken) -> ClientResult<()>
    where
        S: TaskStatusSource + ?Sized,
    {
        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.poll(source, handle, cancel))
                .await
                .unwrap_or_else(|_| {
                    Err(ClientError::TaskTimeout {
                        upid: handle.upid.clone(),
                        after: limit,
                    })
                }),
            None => self.poll(source, handle, cancel).await,
        };

        if let Some(progress) = &self.progress {
            progress.on_finish(handle, &outcome);
        }
        outcome
    }

    async fn poll<S>(&self, source: &S, handle: &TaskHandle, cancel: &CancellationToken) -> ClientResult<()>
    where
        S: TaskStatusSource + ?Sized,
    {
        let mut backoff = self.policy.iter();
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }

            let status = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ClientError::Cancelled),
                status = source.task_status(handle) => status?,
            };

            if let Some(progress) = &self.progress {
                progress.on_poll(handle, &status, attempt);
            }

            if status.is_finished() {
                return if status.is_success() {
                    Ok(())
                } else {
                    Err(ClientError::TaskFailed {
                        upid: handle.upid.clone(),
                        exit_status: status
                            .exit_status
                            .unwrap_or_else(|| "unknown".to_string()),
                    })
                };
            }

            let delay = backoff.next().unwrap_or(self.policy.max);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "task still running");
            sleep_or_cancel(delay, cancel)
                .await
                .map_err(|_| ClientError::Cancelled)?;
            attempt += 1;
        }
    }
}
