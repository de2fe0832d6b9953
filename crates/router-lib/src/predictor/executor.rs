//! Deadline-bounded execution of blocking prediction work
//!
//! Each call gets its own blocking task, so a slow batch never delays the
//! timeout detection of another. On expiry the caller gets
//! [`PredictError::Timeout`] immediately; the task is asked to stop through
//! its cancellation token but may keep running, and whatever it eventually
//! returns is dropped together with its join handle.

use crate::error::PredictError;
use std::time::Duration;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs prediction tasks under an optional wall-clock deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutExecutor {
    timeout: Option<Duration>,
}

impl TimeoutExecutor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Zero or negative disables the bound
    pub fn from_millis(timeout_ms: i64) -> Self {
        match u64::try_from(timeout_ms) {
            Ok(ms) if ms > 0 => Self::new(Some(Duration::from_millis(ms))),
            _ => Self::disabled(),
        }
    }

    pub fn disabled() -> Self {
        Self { timeout: None }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Configured deadline in milliseconds, 0 when unbounded
    pub fn timeout_ms(&self) -> u64 {
        self.timeout
            .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    /// Run `task` on a dedicated blocking slot and wait at most the deadline.
    ///
    /// Exactly one outcome reaches the caller: the task's own result, or a
    /// timeout. Without a deadline the task always runs to completion.
    pub async fn run_bounded<T, F>(&self, task: F) -> Result<T, PredictError>
    where
        F: FnOnce(CancellationToken) -> Result<T, PredictError> + Send + 'static,
        T: Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::task::spawn_blocking({
            let token = token.clone();
            move || task(token)
        });

        let Some(limit) = self.timeout else {
            return handle.await.map_err(task_failed)?;
        };

        match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined.map_err(task_failed)?,
            Err(_) => {
                token.cancel();
                debug!(timeout_ms = self.timeout_ms(), "Prediction deadline expired");
                Err(PredictError::Timeout {
                    timeout_ms: self.timeout_ms(),
                })
            }
        }
    }
}

fn task_failed(err: JoinError) -> PredictError {
    warn!(error = %err, "Prediction task did not complete");
    PredictError::TaskFailed(err.to_string())
}
