use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use strum_macros::{AsRefStr, Display, EnumString};
use tracing::{debug, warn};

use super::aws::servicecatalog::api::{ApiError, CatalogApi, OperationRecord};

/// Record statuses reported by Service Catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Created,
    InProgress,
    InProgressInError,
    Succeeded,
    Failed,
}

/// Pending and target status labels for one wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLabels {
    pub pending: BTreeSet<String>,
    pub target: BTreeSet<String>,
}

impl StatusLabels {
    pub fn new<P, T>(pending: P, target: T) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            pending: pending.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
        }
    }

    pub fn provisioning() -> Self {
        Self::new(
            [RecordStatus::Created, RecordStatus::InProgress].map(|s| s.to_string()),
            [RecordStatus::Succeeded].map(|s| s.to_string()),
        )
    }

    pub fn termination() -> Self {
        Self::new(
            [RecordStatus::Created, RecordStatus::InProgress].map(|s| s.to_string()),
            [RecordStatus::Succeeded].map(|s| s.to_string()),
        )
    }

    pub fn classify(&self, record: OperationRecord) -> Observation {
        if self.target.contains(&record.status) {
            Observation::Succeeded(record)
        } else if self.pending.contains(&record.status) {
            Observation::Pending(record)
        } else {
            Observation::Failed(record)
        }
    }
}

/// Normalized result of one status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Pending(OperationRecord),
    Succeeded(OperationRecord),
    Failed(OperationRecord),
    NotFound,
    TransientError(ApiError),
}

#[async_trait]
pub trait Tracker: Send + Sync {
    async fn observe(&self, record_id: &str, labels: &StatusLabels) -> Observation;
}

/// Tracks operation records through [`CatalogApi::describe_operation`].
#[derive(Clone)]
pub struct RecordTracker {
    api: Arc<dyn CatalogApi>,
}

impl RecordTracker {
    pub fn new(api: Arc<dyn CatalogApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tracker for RecordTracker {
    async fn observe(&self, record_id: &str, labels: &StatusLabels) -> Observation {
        match self.api.describe_operation(record_id).await {
            Ok(record) => {
                debug!(record_id, status = %record.status, "observed operation record");
                labels.classify(record)
            }
            Err(ApiError::NotFound(_)) => {
                // The record can lag behind the submit call that created it.
                debug!(record_id, "operation record not visible yet");
                Observation::NotFound
            }
            Err(err) => {
                warn!(record_id, error = %err, "operation record query failed");
                Observation::TransientError(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v1::aws::servicecatalog::fake::FakeCatalog;
    use std::str::FromStr;

    fn record(status: &str) -> OperationRecord {
        OperationRecord {
            record_id: "rec-1".to_string(),
            status: status.to_string(),
            outputs: vec![],
            errors: vec![],
        }
    }

    #[test]
    fn record_status_uses_remote_spelling() {
        assert_eq!(RecordStatus::InProgressInError.to_string(), "IN_PROGRESS_IN_ERROR");
        assert_eq!(
            RecordStatus::from_str("IN_PROGRESS").unwrap(),
            RecordStatus::InProgress
        );
    }

    #[test]
    fn classify_by_label_sets() {
        let labels = StatusLabels::provisioning();
        assert!(matches!(labels.classify(record("CREATED")), Observation::Pending(_)));
        assert!(matches!(labels.classify(record("IN_PROGRESS")), Observation::Pending(_)));
        assert!(matches!(labels.classify(record("SUCCEEDED")), Observation::Succeeded(_)));
        assert!(matches!(labels.classify(record("FAILED")), Observation::Failed(_)));
        assert!(matches!(
            labels.classify(record("IN_PROGRESS_IN_ERROR")),
            Observation::Failed(_)
        ));
        assert!(matches!(labels.classify(record("")), Observation::Failed(_)));
    }

    #[test]
    fn custom_labels_override_defaults() {
        let labels = StatusLabels::new(["QUEUED"], ["DONE"]);
        assert!(matches!(labels.classify(record("QUEUED")), Observation::Pending(_)));
        assert!(matches!(labels.classify(record("DONE")), Observation::Succeeded(_)));
        assert!(matches!(labels.classify(record("SUCCEEDED")), Observation::Failed(_)));
    }

    #[tokio::test]
    async fn record_tracker_normalizes_remote_answers() {
        let fake = FakeCatalog::new();
        fake.script("rec-1", &["IN_PROGRESS", "SUCCEEDED"]);
        fake.script_error("rec-2", ApiError::Remote("AccessDenied".to_string()));
        let tracker = RecordTracker::new(fake.clone());
        let labels = StatusLabels::provisioning();

        assert!(matches!(
            tracker.observe("rec-1", &labels).await,
            Observation::Pending(ref r) if r.status == "IN_PROGRESS"
        ));
        match tracker.observe("rec-1", &labels).await {
            Observation::Succeeded(record) => assert_eq!(record.output("AccountId"), Some("123456789012")),
            other => panic!("unexpected observation: {other:?}"),
        }
        assert_eq!(tracker.observe("rec-9", &labels).await, Observation::NotFound);
        assert_eq!(
            tracker.observe("rec-2", &labels).await,
            Observation::TransientError(ApiError::Remote("AccessDenied".to_string()))
        );
    }
}
