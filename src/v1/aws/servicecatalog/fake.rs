use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use super::api::{
    ApiError, CatalogApi, InstanceDescriptor, OperationRecord, ProvisionRequest, RecordError,
    RecordOutput, Submission,
};

pub(crate) const ACCOUNT_ID: &str = "123456789012";
pub(crate) const CREATED_TIME: &str = "2024-01-02T03:04:05Z";

/// In-memory catalog. Operation records replay scripted responses and repeat the last
/// one; a record without a script is not found.
#[derive(Default)]
pub(crate) struct FakeCatalog {
    inner: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    next_id: u32,
    instances: BTreeMap<String, InstanceDescriptor>,
    scripts: HashMap<String, VecDeque<Result<OperationRecord, ApiError>>>,
    terminating: HashMap<String, String>,
    submissions: Vec<ProvisionRequest>,
    terminations: Vec<(String, String)>,
    describe_operation_calls: usize,
    provision_error: Option<ApiError>,
    instance_error: Option<ApiError>,
}

pub(crate) fn record(record_id: &str, status: &str) -> OperationRecord {
    let outputs = if status == "SUCCEEDED" {
        vec![
            RecordOutput {
                key: "AccountEmail".to_string(),
                value: "vend@example.com".to_string(),
            },
            RecordOutput {
                key: "AccountId".to_string(),
                value: ACCOUNT_ID.to_string(),
            },
        ]
    } else {
        vec![]
    };
    let errors = if status == "FAILED" {
        vec![RecordError {
            code: "ProvisioningFailed".to_string(),
            description: "account quota exceeded".to_string(),
        }]
    } else {
        vec![]
    };
    OperationRecord {
        record_id: record_id.to_string(),
        status: status.to_string(),
        outputs,
        errors,
    }
}

impl FakeCatalog {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.inner.lock().unwrap()
    }

    pub(crate) fn script(&self, record_id: &str, statuses: &[&str]) {
        self.state().scripts.insert(
            record_id.to_string(),
            statuses.iter().map(|s| Ok(record(record_id, s))).collect(),
        );
    }

    pub(crate) fn script_error(&self, record_id: &str, error: ApiError) {
        self.state()
            .scripts
            .insert(record_id.to_string(), VecDeque::from([Err(error)]));
    }

    pub(crate) fn forget_record(&self, record_id: &str) {
        self.state().scripts.remove(record_id);
    }

    pub(crate) fn insert_instance(&self, external_id: &str) {
        self.state()
            .instances
            .insert(external_id.to_string(), descriptor(external_id, None));
    }

    /// An instance whose product identity is known, as one launched from the console.
    pub(crate) fn insert_launched_instance(&self, external_id: &str, launched: &ProvisionRequest) {
        self.state().instances.insert(
            external_id.to_string(),
            descriptor(external_id, Some(launched)),
        );
    }

    pub(crate) fn remove_instance(&self, external_id: &str) {
        self.state().instances.remove(external_id);
    }

    pub(crate) fn has_instance(&self, external_id: &str) -> bool {
        self.state().instances.contains_key(external_id)
    }

    pub(crate) fn fail_provision(&self, error: ApiError) {
        self.state().provision_error = Some(error);
    }

    pub(crate) fn fail_describe_instance(&self, error: ApiError) {
        self.state().instance_error = Some(error);
    }

    pub(crate) fn submissions(&self) -> Vec<ProvisionRequest> {
        self.state().submissions.clone()
    }

    pub(crate) fn terminations(&self) -> Vec<(String, String)> {
        self.state().terminations.clone()
    }

    pub(crate) fn describe_operation_calls(&self) -> usize {
        self.state().describe_operation_calls
    }
}

fn descriptor(external_id: &str, launched: Option<&ProvisionRequest>) -> InstanceDescriptor {
    InstanceDescriptor {
        arn: Some(format!(
            "arn:aws:servicecatalog:us-east-1:111111111111:stack/vend/{}",
            external_id
        )),
        created_time: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).single(),
        name: launched.map(|r| r.name.clone()),
        product_id: launched.map(|r| r.product_id.clone()),
        artifact_id: launched.map(|r| r.artifact_id.clone()),
    }
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn submit_provision(&self, request: ProvisionRequest) -> Result<Submission, ApiError> {
        let mut state = self.state();
        if let Some(err) = state.provision_error.clone() {
            return Err(err);
        }
        state.next_id += 1;
        let external_id = format!("pp-{}", state.next_id);
        let operation_id = format!("rec-{}", state.next_id);
        state
            .instances
            .insert(external_id.clone(), descriptor(&external_id, Some(&request)));
        state
            .scripts
            .entry(operation_id.clone())
            .or_insert_with(|| VecDeque::from([Ok(record(&operation_id, "SUCCEEDED"))]));
        state.submissions.push(request);
        Ok(Submission {
            external_id,
            operation_id,
        })
    }

    async fn describe_instance(&self, external_id: &str) -> Result<InstanceDescriptor, ApiError> {
        let state = self.state();
        if let Some(err) = state.instance_error.clone() {
            return Err(err);
        }
        state
            .instances
            .get(external_id)
            .cloned()
            .ok_or(ApiError::NotFound(external_id.to_string()))
    }

    async fn describe_operation(&self, operation_id: &str) -> Result<OperationRecord, ApiError> {
        let mut state = self.state();
        state.describe_operation_calls += 1;
        let result = match state.scripts.get_mut(operation_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => return Err(ApiError::NotFound(operation_id.to_string())),
        };
        if matches!(&result, Ok(record) if record.status == "SUCCEEDED") {
            if let Some(external_id) = state.terminating.remove(operation_id) {
                state.instances.remove(&external_id);
            }
        }
        result
    }

    async fn submit_terminate(
        &self,
        external_id: &str,
        idempotency_token: &str,
    ) -> Result<String, ApiError> {
        let mut state = self.state();
        if !state.instances.contains_key(external_id) {
            return Err(ApiError::NotFound(external_id.to_string()));
        }
        state.next_id += 1;
        let operation_id = format!("rec-{}", state.next_id);
        state
            .scripts
            .entry(operation_id.clone())
            .or_insert_with(|| VecDeque::from([Ok(record(&operation_id, "SUCCEEDED"))]));
        state
            .terminating
            .insert(operation_id.clone(), external_id.to_string());
        state
            .terminations
            .push((external_id.to_string(), idempotency_token.to_string()));
        Ok(operation_id)
    }
}
