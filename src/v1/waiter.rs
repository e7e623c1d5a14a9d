use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    aws::servicecatalog::api::{ApiError, OperationRecord},
    manager::ManagerError,
    tracker::{Observation, StatusLabels, Tracker},
};

/// Polls a [`Tracker`] until the record reaches one of the target labels.
///
/// A status that is neither pending nor target ends the wait immediately. A record
/// that is not visible yet is polled again, so `timeout` is the only bound on that case.
#[derive(Debug, Clone)]
pub struct StateWaiter {
    pub labels: StatusLabels,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl StateWaiter {
    pub fn new(labels: StatusLabels, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            labels,
            poll_interval,
            timeout,
        }
    }

    pub async fn wait_for_state<T: Tracker + ?Sized>(
        &self,
        tracker: &T,
        record_id: &str,
        cancel: &CancellationToken,
    ) -> Result<OperationRecord, WaitError> {
        if self.labels.target.is_empty() {
            return Err(WaitError::NoTargetStates);
        }
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut last_status = String::new();
        let mut polls = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(WaitError::Cancelled(record_id.to_string()));
            }
            polls += 1;
            let observation = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(WaitError::Cancelled(record_id.to_string()));
                }
                observation = tracker.observe(record_id, &self.labels) => observation,
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(record_id, polls, "status query still running at the deadline");
                    return Err(WaitError::Timeout {
                        record_id: record_id.to_string(),
                        last_status,
                        timeout: self.timeout,
                    });
                }
            };
            match observation {
                Observation::Succeeded(record) => {
                    info!(
                        record_id,
                        status = %record.status,
                        polls,
                        elapsed = ?started.elapsed(),
                        "operation reached target state"
                    );
                    return Ok(record);
                }
                Observation::Failed(record) => {
                    warn!(record_id, status = %record.status, polls, "operation failed");
                    return Err(WaitError::OperationFailed {
                        status: record.status.clone(),
                        record,
                    });
                }
                Observation::TransientError(err) => return Err(WaitError::Tracker(err)),
                Observation::NotFound => last_status.clear(),
                Observation::Pending(record) => last_status = record.status,
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(WaitError::Timeout {
                    record_id: record_id.to_string(),
                    last_status,
                    timeout: self.timeout,
                });
            }
            let nap = self.poll_interval.min(deadline - now);
            debug!(record_id, status = %last_status, ?nap, "operation still pending");
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(WaitError::Cancelled(record_id.to_string()));
                }
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("Timeout after {timeout:?} waiting for {record_id} (last status: {last_status:?})")]
    Timeout {
        record_id: String,
        last_status: String,
        timeout: Duration,
    },
    #[error("OperationFailed: unexpected status {status}")]
    OperationFailed {
        status: String,
        record: OperationRecord,
    },
    #[error("TrackerError: {0}")]
    Tracker(ApiError),
    #[error("Cancelled while waiting for {0}")]
    Cancelled(String),
    #[error("No target states configured")]
    NoTargetStates,
}

impl From<WaitError> for ManagerError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Timeout { .. } => ManagerError::Timeout(err.to_string()),
            WaitError::OperationFailed { status, record } => ManagerError::OperationFailed {
                status,
                diagnostics: record.diagnostics(),
            },
            WaitError::Tracker(err) => err.into(),
            WaitError::Cancelled(record_id) => ManagerError::Cancelled(record_id),
            WaitError::NoTargetStates => ManagerError::Validation(err.to_string()),
        }
    }
}
