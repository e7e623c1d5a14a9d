use std::{collections::BTreeMap, sync::Arc};

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::api::{ApiError, CatalogApi, OperationRecord, ProvisionRequest};
use crate::v1::{
    aws::AwsManager,
    manager::{ManagerError, ResourceManager, ResourceOutput},
    tracker::{RecordTracker, StatusLabels},
    waiter::StateWaiter,
};

pub const ACCOUNT_ID_KEY: &str = "AccountId";
const MAX_NAME_LEN: usize = 64;
const RESERVED_TAG_PREFIX: &str = "aws:";

pub type AccountVendingManager =
    AwsManager<AccountVendingInput, AccountVendingOutput, Arc<dyn CatalogApi>>;

/// Declared configuration of a vended account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountVendingInput {
    pub product_id: String,
    pub artifact_id: String,
    pub name: String,
    /// Passed through to the product as opaque strings.
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Operation outputs copied into the derived attributes on every read.
    #[serde(default = "default_output_keys")]
    pub output_keys: Vec<String>,
}

fn default_output_keys() -> Vec<String> {
    vec![ACCOUNT_ID_KEY.to_string()]
}

impl AccountVendingInput {
    pub fn validate(&self) -> Result<(), ManagerError> {
        if self.product_id.trim().is_empty() {
            return Err(ManagerError::Validation("product_id is required".to_string()));
        }
        if self.artifact_id.trim().is_empty() {
            return Err(ManagerError::Validation("artifact_id is required".to_string()));
        }
        let name_len = self.name.chars().count();
        if name_len == 0 || name_len > MAX_NAME_LEN {
            return Err(ManagerError::Validation(format!(
                "name must be between 1 and {} characters, got {}",
                MAX_NAME_LEN, name_len
            )));
        }
        Ok(())
    }

    /// Tags sent to the catalog; keys under the reserved `aws:` prefix are dropped.
    pub fn user_tags(&self) -> BTreeMap<String, String> {
        self.tags
            .iter()
            .filter(|(key, _)| !key.starts_with(RESERVED_TAG_PREFIX))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Submitted fields that differ from `other`.
    pub fn changed_fields(&self, other: &AccountVendingInput) -> Vec<&'static str> {
        let mut changed = vec![];
        if self.product_id != other.product_id {
            changed.push("product_id");
        }
        if self.artifact_id != other.artifact_id {
            changed.push("artifact_id");
        }
        if self.name != other.name {
            changed.push("name");
        }
        if self.parameters != other.parameters {
            changed.push("parameters");
        }
        if self.user_tags() != other.user_tags() {
            changed.push("tags");
        }
        changed
    }

    fn provision_request(&self) -> ProvisionRequest {
        ProvisionRequest {
            product_id: self.product_id.clone(),
            artifact_id: self.artifact_id.clone(),
            name: self.name.clone(),
            parameters: self.parameters.clone(),
            tags: self.user_tags(),
            idempotency_token: Uuid::new_v4().to_string(),
        }
    }
}

/// Local record of a vended account. An instance without `external_id` is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountVendingOutput {
    pub external_id: Option<String>,
    /// Last create or terminate operation.
    pub operation_id: Option<String>,
    /// Provisioning operation whose outputs feed `derived_attributes`.
    pub provisioning_record_id: Option<String>,
    /// Last status seen on the provisioning record.
    pub provisioning_status: Option<String>,
    pub arn: Option<String>,
    pub created_time: Option<String>,
    pub derived_attributes: BTreeMap<String, String>,
    /// Configuration submitted on create.
    pub applied: Option<AccountVendingInput>,
    #[serde(default)]
    pub observed: ObservedProduct,
}

/// Product identity as reported by the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedProduct {
    pub name: Option<String>,
    pub product_id: Option<String>,
    pub artifact_id: Option<String>,
}

impl ObservedProduct {
    /// Declared fields that contradict what the catalog reports. Unknown fields never do.
    pub fn mismatches(&self, input: &AccountVendingInput) -> Vec<&'static str> {
        [
            ("product_id", &self.product_id, &input.product_id),
            ("artifact_id", &self.artifact_id, &input.artifact_id),
            ("name", &self.name, &input.name),
        ]
        .into_iter()
        .filter(|(_, seen, declared)| seen.as_deref().is_some_and(|seen| seen != declared.as_str()))
        .map(|(field, _, _)| field)
        .collect()
    }
}

impl ResourceOutput for AccountVendingOutput {
    fn is_present(&self) -> bool {
        self.external_id.is_some()
    }
}

impl AccountVendingOutput {
    pub fn imported(external_id: impl Into<String>) -> Self {
        Self {
            external_id: Some(external_id.into()),
            ..Default::default()
        }
    }

    pub fn account_id(&self) -> Option<&str> {
        self.derived_attributes
            .get(ACCOUNT_ID_KEY)
            .map(String::as_str)
    }

    fn output_keys(&self) -> Vec<String> {
        self.applied
            .as_ref()
            .map(|applied| applied.output_keys.clone())
            .unwrap_or_else(default_output_keys)
    }

    fn derive_from(&mut self, record: &OperationRecord) {
        self.derived_attributes = self
            .output_keys()
            .into_iter()
            .filter_map(|key| record.output(&key).map(|value| (key.clone(), value.to_string())))
            .collect();
    }
}

impl AccountVendingManager {
    fn provisioning_waiter(&self) -> StateWaiter {
        StateWaiter::new(
            StatusLabels::provisioning(),
            self.settings.poll_interval,
            self.settings.create_timeout,
        )
    }

    fn termination_waiter(&self) -> StateWaiter {
        StateWaiter::new(
            StatusLabels::termination(),
            self.settings.poll_interval,
            self.settings.delete_timeout,
        )
    }

    /// Finishes a provisioning operation left unsettled by an earlier create: a pending
    /// record is waited on again, a failed one is reported with its diagnostics.
    fn settle(&self, state: &mut AccountVendingOutput) -> Result<(), ManagerError> {
        let labels = StatusLabels::provisioning();
        let record_id = match (&state.provisioning_record_id, &state.provisioning_status) {
            (Some(record_id), Some(status)) if !labels.target.contains(status) => {
                if labels.pending.contains(status) {
                    info!(%record_id, %status, "resuming wait for provisioned product");
                }
                record_id.clone()
            }
            _ => return Ok(()),
        };
        self.wait(&self.provisioning_waiter(), &record_id)?;
        self.read(state)
    }

    fn wait(&self, waiter: &StateWaiter, record_id: &str) -> Result<OperationRecord, ManagerError> {
        let tracker = RecordTracker::new(self.client.clone());
        self.handle
            .block_on(waiter.wait_for_state(&tracker, record_id, &self.cancel))
            .map_err(ManagerError::from)
    }
}

impl ResourceManager<AccountVendingInput, AccountVendingOutput> for AccountVendingManager {
    fn create(
        &self,
        input: &AccountVendingInput,
        state: &mut AccountVendingOutput,
    ) -> Result<(), ManagerError> {
        input.validate()?;
        let request = input.provision_request();
        debug!(?request, "provisioning product");
        let submission = self
            .handle
            .block_on(self.client.submit_provision(request))?;
        info!(
            external_id = %submission.external_id,
            record_id = %submission.operation_id,
            "provisioned product submitted"
        );
        *state = AccountVendingOutput {
            external_id: Some(submission.external_id.clone()),
            operation_id: Some(submission.operation_id.clone()),
            provisioning_record_id: Some(submission.operation_id.clone()),
            applied: Some(input.clone()),
            ..Default::default()
        };
        debug!(external_id = %submission.external_id, "waiting for provisioned product to become available");
        self.wait(&self.provisioning_waiter(), &submission.operation_id)?;
        self.read(state)
    }

    fn read(&self, state: &mut AccountVendingOutput) -> Result<(), ManagerError> {
        let external_id = match state.external_id.clone() {
            Some(external_id) => external_id,
            None => return Ok(()),
        };
        debug!(%external_id, "reading provisioned product");
        let descriptor = match self
            .handle
            .block_on(self.client.describe_instance(&external_id))
        {
            Ok(descriptor) => descriptor,
            Err(ApiError::NotFound(_)) => {
                warn!(%external_id, "provisioned product not found, removing from state");
                *state = AccountVendingOutput::default();
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        state.arn = descriptor.arn;
        state.created_time = descriptor
            .created_time
            .map(|time| time.to_rfc3339_opts(SecondsFormat::Secs, true));
        state.observed = ObservedProduct {
            name: descriptor.name,
            product_id: descriptor.product_id,
            artifact_id: descriptor.artifact_id,
        };

        let record_id = match state.provisioning_record_id.clone() {
            Some(record_id) => record_id,
            None => {
                state.derived_attributes.clear();
                return Ok(());
            }
        };
        match self
            .handle
            .block_on(self.client.describe_operation(&record_id))
        {
            Ok(record) => {
                // Outputs only count once provisioning has succeeded.
                if StatusLabels::provisioning().target.contains(&record.status) {
                    state.derive_from(&record);
                } else {
                    state.derived_attributes.clear();
                }
                state.provisioning_status = Some(record.status);
            }
            Err(ApiError::NotFound(_)) => {
                warn!(%external_id, %record_id, "provisioning record not found, clearing derived attributes");
                state.derived_attributes.clear();
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    fn update(
        &self,
        input: &AccountVendingInput,
        state: &mut AccountVendingOutput,
    ) -> Result<(), ManagerError> {
        input.validate()?;
        self.settle(state)?;
        let mut changed = state.observed.mismatches(input);
        if let Some(applied) = state.applied.as_ref() {
            for field in applied.changed_fields(input) {
                if !changed.contains(&field) {
                    changed.push(field);
                }
            }
        }
        if !changed.is_empty() {
            return Err(ManagerError::CannotSyncWithoutRecreate(format!(
                "{:?} of {} cannot be changed in place",
                changed,
                state.external_id.as_deref().unwrap_or_default()
            )));
        }
        state.applied = Some(input.clone());
        self.read(state)
    }

    fn delete(&self, state: &mut AccountVendingOutput) -> Result<(), ManagerError> {
        let external_id = match state.external_id.clone() {
            Some(external_id) => external_id,
            None => return Ok(()),
        };
        let token = Uuid::new_v4().to_string();
        debug!(%external_id, "terminating provisioned product");
        let operation_id = match self
            .handle
            .block_on(self.client.submit_terminate(&external_id, &token))
        {
            Ok(operation_id) => operation_id,
            Err(ApiError::NotFound(_)) => {
                warn!(%external_id, "provisioned product already gone");
                *state = AccountVendingOutput::default();
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        state.operation_id = Some(operation_id.clone());
        debug!(%external_id, record_id = %operation_id, "waiting for provisioned product to terminate");
        self.wait(&self.termination_waiter(), &operation_id)?;
        info!(%external_id, "provisioned product terminated");
        *state = AccountVendingOutput::default();
        Ok(())
    }

    fn import(&self, external_id: &str) -> Result<AccountVendingOutput, ManagerError> {
        let mut state = AccountVendingOutput::imported(external_id);
        self.read(&mut state)?;
        if !state.is_present() {
            return Err(ManagerError::NotFound(external_id.to_string()));
        }
        Ok(state)
    }
}
