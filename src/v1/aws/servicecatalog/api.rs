use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_servicecatalog::{
    types::{self, ProvisioningParameter, Tag},
    Client,
};
use aws_smithy_types_convert::date_time::DateTimeExt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::v1::manager::ManagerError;

const ACCEPT_LANGUAGE: &str = "en";

/// The slice of the provisioning API the lifecycle handler depends on.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn submit_provision(&self, request: ProvisionRequest) -> Result<Submission, ApiError>;
    async fn describe_instance(&self, external_id: &str) -> Result<InstanceDescriptor, ApiError>;
    async fn describe_operation(&self, operation_id: &str) -> Result<OperationRecord, ApiError>;
    /// Returns the id of the termination operation.
    async fn submit_terminate(
        &self,
        external_id: &str,
        idempotency_token: &str,
    ) -> Result<String, ApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub product_id: String,
    pub artifact_id: String,
    pub name: String,
    pub parameters: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    pub idempotency_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub external_id: String,
    pub operation_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceDescriptor {
    pub arn: Option<String>,
    pub created_time: Option<DateTime<Utc>>,
    pub name: Option<String>,
    pub product_id: Option<String>,
    pub artifact_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutput {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub code: String,
    pub description: String,
}

/// One async submit/terminate call as tracked by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub record_id: String,
    /// Raw remote status, e.g. `IN_PROGRESS`.
    pub status: String,
    pub outputs: Vec<RecordOutput>,
    pub errors: Vec<RecordError>,
}

impl OperationRecord {
    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|output| output.key == key)
            .map(|output| output.value.as_str())
    }

    pub fn diagnostics(&self) -> String {
        if self.errors.is_empty() {
            return "no error details reported".to_string();
        }
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.description))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("NotFound: {0}")]
    NotFound(String),
    #[error("RemoteError: {0}")]
    Remote(String),
}

impl From<ApiError> for ManagerError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::NotFound(msg) => ManagerError::NotFound(msg),
            ApiError::Remote(msg) => ManagerError::Remote(msg),
        }
    }
}

/// [`CatalogApi`] backed by AWS Service Catalog.
pub struct ServiceCatalogApi {
    client: Client,
}

impl ServiceCatalogApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CatalogApi for ServiceCatalogApi {
    async fn submit_provision(&self, request: ProvisionRequest) -> Result<Submission, ApiError> {
        let parameters = request
            .parameters
            .iter()
            .map(|(key, value)| {
                debug!(%key, %value, "provisioning parameter");
                ProvisioningParameter::builder().key(key).value(value).build()
            })
            .collect::<Vec<_>>();
        let tags = request
            .tags
            .iter()
            .map(|(key, value)| Tag::builder().key(key).value(value).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ApiError::Remote(format!("invalid tag: {:?}", e)))?;
        let response = self
            .client
            .provision_product()
            .accept_language(ACCEPT_LANGUAGE)
            .provision_token(&request.idempotency_token)
            .product_id(&request.product_id)
            .provisioning_artifact_id(&request.artifact_id)
            .provisioned_product_name(&request.name)
            .set_provisioning_parameters(Some(parameters))
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| ApiError::Remote(format!("{:?}", e.into_source())))?;
        let detail = response
            .record_detail
            .ok_or(ApiError::Remote("ProvisionProduct returned no record".to_string()))?;
        match (detail.provisioned_product_id, detail.record_id) {
            (Some(external_id), Some(operation_id)) => Ok(Submission {
                external_id,
                operation_id,
            }),
            _ => Err(ApiError::Remote(
                "ProvisionProduct record is missing its identifiers".to_string(),
            )),
        }
    }

    async fn describe_instance(&self, external_id: &str) -> Result<InstanceDescriptor, ApiError> {
        let response = self
            .client
            .describe_provisioned_product()
            .accept_language(ACCEPT_LANGUAGE)
            .id(external_id)
            .send()
            .await
            .map_err(|e| {
                let e = e.into_service_error();
                if e.is_resource_not_found_exception() {
                    ApiError::NotFound(external_id.to_string())
                } else {
                    ApiError::Remote(format!("{:?}", e))
                }
            })?;
        let detail = response
            .provisioned_product_detail
            .ok_or(ApiError::NotFound(external_id.to_string()))?;
        Ok(InstanceDescriptor {
            arn: detail.arn,
            created_time: detail
                .created_time
                .and_then(|time| time.to_chrono_utc().ok()),
            name: detail.name,
            product_id: detail.product_id,
            artifact_id: detail.provisioning_artifact_id,
        })
    }

    async fn describe_operation(&self, operation_id: &str) -> Result<OperationRecord, ApiError> {
        let mut page_token: Option<String> = None;
        let mut record: Option<OperationRecord> = None;
        loop {
            let response = self
                .client
                .describe_record()
                .accept_language(ACCEPT_LANGUAGE)
                .id(operation_id)
                .set_page_token(page_token.take())
                .send()
                .await
                .map_err(|e| {
                    let e = e.into_service_error();
                    if e.is_resource_not_found_exception() {
                        ApiError::NotFound(operation_id.to_string())
                    } else {
                        ApiError::Remote(format!("{:?}", e))
                    }
                })?;
            if record.is_none() {
                let detail = response
                    .record_detail
                    .ok_or(ApiError::NotFound(operation_id.to_string()))?;
                record = Some(record_from_detail(operation_id, detail));
            }
            if let Some(current) = record.as_mut() {
                // Outputs are paged; the record detail only comes with the first page.
                current.outputs.extend(
                    response
                        .record_outputs
                        .unwrap_or_default()
                        .into_iter()
                        .map(|output| RecordOutput {
                            key: output.output_key.unwrap_or_default(),
                            value: output.output_value.unwrap_or_default(),
                        }),
                );
            }
            page_token = response.next_page_token.filter(|token| !token.is_empty());
            if page_token.is_none() {
                break;
            }
        }
        record.ok_or(ApiError::NotFound(operation_id.to_string()))
    }

    async fn submit_terminate(
        &self,
        external_id: &str,
        idempotency_token: &str,
    ) -> Result<String, ApiError> {
        let response = self
            .client
            .terminate_provisioned_product()
            .accept_language(ACCEPT_LANGUAGE)
            .provisioned_product_id(external_id)
            .terminate_token(idempotency_token)
            .send()
            .await
            .map_err(|e| {
                let e = e.into_service_error();
                if e.is_resource_not_found_exception() {
                    ApiError::NotFound(external_id.to_string())
                } else {
                    ApiError::Remote(format!("{:?}", e))
                }
            })?;
        response
            .record_detail
            .and_then(|detail| detail.record_id)
            .ok_or(ApiError::Remote(
                "TerminateProvisionedProduct returned no record id".to_string(),
            ))
    }
}

fn record_from_detail(operation_id: &str, detail: types::RecordDetail) -> OperationRecord {
    OperationRecord {
        record_id: detail.record_id.unwrap_or(operation_id.to_string()),
        status: detail
            .status
            .map(|status| status.as_str().to_string())
            .unwrap_or_default(),
        outputs: vec![],
        errors: detail
            .record_errors
            .unwrap_or_default()
            .into_iter()
            .map(|e| RecordError {
                code: e.code.unwrap_or_default(),
                description: e.description.unwrap_or_default(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(errors: Vec<RecordError>) -> OperationRecord {
        OperationRecord {
            record_id: "rec-1".to_string(),
            status: "FAILED".to_string(),
            outputs: vec![
                RecordOutput {
                    key: "AccountEmail".to_string(),
                    value: "ops@example.com".to_string(),
                },
                RecordOutput {
                    key: "AccountId".to_string(),
                    value: "123456789012".to_string(),
                },
            ],
            errors,
        }
    }

    #[test]
    fn output_finds_value_by_key() {
        let record = record(vec![]);
        assert_eq!(record.output("AccountId"), Some("123456789012"));
        assert_eq!(record.output("Missing"), None);
    }

    #[test]
    fn diagnostics_joins_remote_errors() {
        let record = record(vec![
            RecordError {
                code: "E1".to_string(),
                description: "quota exceeded".to_string(),
            },
            RecordError {
                code: "E2".to_string(),
                description: "rolled back".to_string(),
            },
        ]);
        assert_eq!(record.diagnostics(), "E1: quota exceeded; E2: rolled back");
    }

    #[test]
    fn diagnostics_without_errors() {
        assert_eq!(record(vec![]).diagnostics(), "no error details reported");
    }
}
