//! Operation gateway
//!
//! One trait, two wire dialects:
//! - [`RestGateway`] for self-hosted servers (REST-style item CRUD)
//! - [`CloudGateway`] for the hosted `/api/v3/memory` API
//!
//! The dialect is picked once from the credential in [`connect`]; shared
//! code never branches on it. Every remote call of either dialect goes
//! through the retrying transport in [`http`].

mod cloud;
mod http;
mod rest;
mod task;

pub use cloud::CloudGateway;
pub use http::HttpTransport;
pub use rest::RestGateway;
pub use task::{WaitOptions, wait_for_task};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::HttpConfig;
use crate::credential::{ApiKind, Credential};
use crate::error::{ClassifiedError, ErrorCode, Result};
use crate::logging::RequestLogger;
use crate::operation::{
    CreateItemRequest, DeleteItemRequest, ListRequest, ListResponse, MemorizeRequest,
    MemorizeResponse, OperationKind, OperationRequest, RawResponse, RetrieveRequest,
    RetrieveResponse, TaskStatus, TaskStatusRequest, UpdateItemRequest,
};
use crate::retry::RetryConfig;

/// Typed access to the remote memory API.
///
/// Implementations are stateless apart from the shared HTTP client and can
/// be used concurrently by every record of a batch.
#[async_trait]
pub trait OperationGateway: Send + Sync {
    fn kind(&self) -> ApiKind;

    async fn memorize(&self, request: &MemorizeRequest) -> Result<MemorizeResponse>;

    async fn retrieve(&self, request: &RetrieveRequest) -> Result<RetrieveResponse>;

    async fn list_items(&self, request: &ListRequest) -> Result<ListResponse>;

    async fn create_item(&self, request: &CreateItemRequest) -> Result<Value>;

    async fn update_item(&self, request: &UpdateItemRequest) -> Result<Value>;

    async fn delete_item(&self, request: &DeleteItemRequest) -> Result<Value>;

    async fn poll_task_status(&self, request: &TaskStatusRequest) -> Result<TaskStatus>;

    /// Validate `request` and dispatch it to the matching method.
    async fn execute(&self, request: &OperationRequest) -> Result<RawResponse> {
        request.validate()?;
        match request {
            OperationRequest::Memorize(req) => self.memorize(req).await.map(RawResponse::Memorize),
            OperationRequest::Retrieve(req) => self.retrieve(req).await.map(RawResponse::Retrieve),
            OperationRequest::ListItems(req) => self.list_items(req).await.map(RawResponse::List),
            OperationRequest::CreateItem(req) => self.create_item(req).await.map(RawResponse::Other),
            OperationRequest::UpdateItem(req) => self.update_item(req).await.map(RawResponse::Other),
            OperationRequest::DeleteItem(req) => self.delete_item(req).await.map(RawResponse::Other),
            OperationRequest::PollTaskStatus(req) => {
                let status = self.poll_task_status(req).await?;
                task_status_value(&status).map(RawResponse::Other)
            }
        }
    }
}

pub(crate) fn task_status_value(status: &TaskStatus) -> Result<Value> {
    serde_json::to_value(status).map_err(|e| {
        ClassifiedError::new(
            ErrorCode::UnexpectedError,
            format!("Could not encode task status: {e}"),
            None,
        )
    })
}

/// The operation exists on the other dialect only.
pub(crate) fn unsupported(kind: OperationKind, dialect: ApiKind) -> ClassifiedError {
    let dialect = match dialect {
        ApiKind::Cloud => "the memU cloud API",
        ApiKind::SelfHosted => "self-hosted memU servers",
    };
    ClassifiedError::validation(format!("{kind} is not supported by {dialect}"))
}

/// Build the gateway matching the credential's dialect.
pub fn connect(
    credential: &Credential,
    http: &HttpConfig,
    retry: &RetryConfig,
    logger: Arc<dyn RequestLogger>,
) -> Result<Arc<dyn OperationGateway>> {
    let transport = HttpTransport::new(credential, http, retry.clone(), logger)?;
    let gateway: Arc<dyn OperationGateway> = match credential.kind {
        ApiKind::SelfHosted => Arc::new(RestGateway::new(transport)),
        ApiKind::Cloud => Arc::new(CloudGateway::new(transport)),
    };
    tracing::debug!(
        base_url = %credential.endpoint(),
        kind = ?credential.kind,
        "memU gateway ready"
    );
    Ok(gateway)
}
