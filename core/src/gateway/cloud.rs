//! memU cloud dialect (`/api/v3/memory`)
//!
//! The cloud API is conversation-centric: memorize is asynchronous and
//! returns a task handle, and there is no item-level CRUD.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::http::{HttpTransport, decode};
use super::{OperationGateway, unsupported};
use crate::credential::ApiKind;
use crate::error::{ClassifiedError, Result};
use crate::operation::{
    CreateItemRequest, DeleteItemRequest, ListRequest, ListResponse, ListTarget, MemorizeRequest,
    MemorizeResponse, MemorizeSource, OperationKind, RetrieveRequest, RetrieveResponse,
    TaskStatus, TaskStatusRequest, UpdateItemRequest, UserScope,
};

const MEMORIZE_PATH: &str = "/api/v3/memory/memorize";
const RETRIEVE_PATH: &str = "/api/v3/memory/retrieve";
const CATEGORIES_PATH: &str = "/api/v3/memory/categories";

#[derive(Debug)]
pub struct CloudGateway {
    transport: HttpTransport,
}

impl CloudGateway {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

/// Cloud calls are always scoped to a user and an agent.
fn scoped_body(user: &UserScope) -> Result<Map<String, Value>> {
    let (Some(user_id), Some(agent_id)) = (&user.user_id, &user.agent_id) else {
        return Err(ClassifiedError::validation(
            "user_id and agent_id are required by the memU cloud API",
        ));
    };
    if user_id.trim().is_empty() || agent_id.trim().is_empty() {
        return Err(ClassifiedError::validation(
            "user_id and agent_id must not be empty",
        ));
    }
    let mut body = Map::new();
    body.insert("user_id".to_string(), json!(user_id));
    body.insert("agent_id".to_string(), json!(agent_id));
    Ok(body)
}

#[async_trait]
impl OperationGateway for CloudGateway {
    fn kind(&self) -> ApiKind {
        ApiKind::Cloud
    }

    async fn memorize(&self, request: &MemorizeRequest) -> Result<MemorizeResponse> {
        let MemorizeSource::Conversation(messages) = &request.source else {
            return Err(ClassifiedError::validation(
                "The memU cloud API memorizes conversations; resource_url is not accepted",
            ));
        };
        let mut body = scoped_body(&request.user)?;
        body.insert("conversation".to_string(), json!(messages));
        if let Some(user_name) = &request.user.user_name {
            body.insert("user_name".to_string(), json!(user_name));
        }
        if let Some(agent_name) = &request.user.agent_name {
            body.insert("agent_name".to_string(), json!(agent_name));
        }
        if let Some(session_date) = &request.session_date {
            body.insert("session_date".to_string(), json!(session_date));
        }

        let value = self
            .transport
            .post(MEMORIZE_PATH, &Value::Object(body), "memorize")
            .await?;
        decode(value, "memorize")
    }

    async fn retrieve(&self, request: &RetrieveRequest) -> Result<RetrieveResponse> {
        // The cloud endpoint takes one query; the latest non-empty one wins
        let Some(query) = request.queries.iter().rev().find(|q| !q.trim().is_empty()) else {
            return Err(ClassifiedError::validation(
                "At least one non-empty query is required",
            ));
        };
        let mut body = scoped_body(&request.user)?;
        body.insert("query".to_string(), json!(query));

        let value = self
            .transport
            .post(RETRIEVE_PATH, &Value::Object(body), "retrieve")
            .await?;
        decode(value, "retrieve")
    }

    async fn list_items(&self, request: &ListRequest) -> Result<ListResponse> {
        if request.target != ListTarget::Categories {
            return Err(ClassifiedError::validation(
                "The memU cloud API only lists categories; set target to categories",
            ));
        }
        let body = scoped_body(&request.user)?;
        let value = self
            .transport
            .post(CATEGORIES_PATH, &Value::Object(body), "listItems")
            .await?;
        match value {
            Value::Array(categories) => Ok(ListResponse {
                categories,
                ..Default::default()
            }),
            other => decode(other, "listItems"),
        }
    }

    async fn create_item(&self, _request: &CreateItemRequest) -> Result<Value> {
        Err(unsupported(OperationKind::CreateItem, self.kind()))
    }

    async fn update_item(&self, _request: &UpdateItemRequest) -> Result<Value> {
        Err(unsupported(OperationKind::UpdateItem, self.kind()))
    }

    async fn delete_item(&self, _request: &DeleteItemRequest) -> Result<Value> {
        Err(unsupported(OperationKind::DeleteItem, self.kind()))
    }

    async fn poll_task_status(&self, request: &TaskStatusRequest) -> Result<TaskStatus> {
        let path = format!(
            "{MEMORIZE_PATH}/status/{}",
            urlencoding::encode(&request.task_id)
        );
        let value = self.transport.get(&path, &[], "pollTaskStatus").await?;
        decode(value, "pollTaskStatus")
    }
}
