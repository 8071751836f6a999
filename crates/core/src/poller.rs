use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::api::{ApiError, OperationHandle, OperationStatus, Submitted};
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Delay between status polls when the API gives no `retry_after`.
    pub interval_ms: u64,
    /// Upper bound for the backoff after transport failures.
    pub max_interval_ms: u64,
    /// Consecutive transport failures tolerated while polling.
    pub transport_retries: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { interval_ms: 10_000, max_interval_ms: 60_000, transport_retries: 5 }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

/// Drives long-running operations to a terminal state.
///
/// Only the status polls are retried; the mutating call that produced the
/// handle is never re-issued. Cancellation stops waiting and leaves the remote
/// operation wherever the API has it.
#[derive(Debug, Clone, Default)]
pub struct Poller {
    config: PollerConfig,
}

impl Poller {
    pub fn new(config: PollerConfig) -> Self {
        Self { config }
    }

    pub async fn settle(&self, submitted: Submitted, cancel: &CancellationToken) -> Result<Option<Json>, Error> {
        match submitted {
            Submitted::Done(body) => Ok(body),
            Submitted::Pending(handle) => self.wait(handle, cancel).await,
        }
    }

    #[instrument(skip_all, fields(operation = handle.description()))]
    pub async fn wait(&self, mut handle: OperationHandle, cancel: &CancellationToken) -> Result<Option<Json>, Error> {
        let mut failures = 0;
        loop {
            let polled = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                polled = handle.poll() => polled,
            };

            let delay = match polled {
                Ok(OperationStatus::Succeeded(body)) => {
                    debug!("operation completed");
                    return Ok(body);
                }
                Ok(OperationStatus::Failed(diagnostic)) => return Err(Error::OperationFailed(diagnostic)),
                Ok(OperationStatus::InProgress { retry_after }) => {
                    failures = 0;
                    let delay = retry_after.unwrap_or_else(|| self.config.interval());
                    debug!(?delay, "operation still in progress");
                    delay
                }
                Err(ApiError::Transport(reason)) if failures < self.config.transport_retries => {
                    failures += 1;
                    let delay = self.backoff(failures);
                    warn!(%reason, attempt = failures, ?delay, "polling failed, retrying");
                    delay
                }
                Err(err) => return Err(err.into()),
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn backoff(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.min(16));
        self.config.interval().saturating_mul(factor).min(self.config.max_interval())
    }
}
