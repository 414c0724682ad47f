//! Self-hosted memU server dialect

use async_trait::async_trait;
use reqwest::Method;
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

#[derive(Debug)]
pub struct RestGateway {
    transport: HttpTransport,
}

impl RestGateway {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

fn item_path(id: &str) -> String {
    format!("/items/{}", urlencoding::encode(id))
}

fn insert_user(body: &mut Map<String, Value>, user: &UserScope) {
    if !user.is_empty() {
        body.insert("user".to_string(), Value::Object(user.to_map()));
    }
}

#[async_trait]
impl OperationGateway for RestGateway {
    fn kind(&self) -> ApiKind {
        ApiKind::SelfHosted
    }

    async fn memorize(&self, request: &MemorizeRequest) -> Result<MemorizeResponse> {
        let MemorizeSource::Resource { url, modality } = &request.source else {
            return Err(ClassifiedError::validation(
                "Self-hosted memorize takes a resource_url, not inline conversation messages",
            ));
        };
        let mut body = Map::new();
        body.insert("resource_url".to_string(), json!(url));
        body.insert("modality".to_string(), json!(modality));
        insert_user(&mut body, &request.user);

        let value = self
            .transport
            .post("/memorize", &Value::Object(body), "memorize")
            .await?;
        decode(value, "memorize")
    }

    async fn retrieve(&self, request: &RetrieveRequest) -> Result<RetrieveResponse> {
        let queries: Vec<Value> = request
            .queries
            .iter()
            .filter(|q| !q.trim().is_empty())
            .map(|q| json!({"role": "user", "content": {"text": q}}))
            .collect();

        let mut filter = request.filters.clone();
        filter.extend(request.user.to_map());

        let mut body = Map::new();
        body.insert("queries".to_string(), Value::Array(queries));
        if !filter.is_empty() {
            body.insert("where".to_string(), Value::Object(filter));
        }
        if let Some(method) = request.method {
            body.insert("method".to_string(), json!(method));
        }

        let value = self
            .transport
            .post("/retrieve", &Value::Object(body), "retrieve")
            .await?;
        decode(value, "retrieve")
    }

    async fn list_items(&self, request: &ListRequest) -> Result<ListResponse> {
        let path = match request.target {
            ListTarget::Items => "/items",
            ListTarget::Categories => "/categories",
        };
        let mut query: Vec<(String, String)> = Vec::new();
        if let Some(limit) = request.limit {
            query.push(("limit".to_string(), limit.to_string()));
        }
        query.extend(request.filters.iter().map(|(k, v)| (k.clone(), v.clone())));
        for (key, value) in request.user.to_map() {
            if let Value::String(value) = value {
                query.push((key, value));
            }
        }

        let value = self.transport.get(path, &query, "listItems").await?;
        match value {
            // Some servers answer with the bare collection
            Value::Array(entries) => Ok(match request.target {
                ListTarget::Items => ListResponse {
                    items: entries,
                    ..Default::default()
                },
                ListTarget::Categories => ListResponse {
                    categories: entries,
                    ..Default::default()
                },
            }),
            Value::Null => Ok(ListResponse::default()),
            other => decode(other, "listItems"),
        }
    }

    async fn create_item(&self, request: &CreateItemRequest) -> Result<Value> {
        let mut body = Map::new();
        body.insert("memory_type".to_string(), json!(request.memory_type));
        body.insert("content".to_string(), json!(request.content));
        body.insert("categories".to_string(), json!(request.categories));
        insert_user(&mut body, &request.user);

        self.transport
            .post("/items", &Value::Object(body), "createItem")
            .await
    }

    async fn update_item(&self, request: &UpdateItemRequest) -> Result<Value> {
        let mut body = Map::new();
        if let Some(memory_type) = request.memory_type {
            body.insert("memory_type".to_string(), json!(memory_type));
        }
        if let Some(content) = &request.content {
            body.insert("content".to_string(), json!(content));
        }
        if let Some(categories) = &request.categories {
            body.insert("categories".to_string(), json!(categories));
        }
        insert_user(&mut body, &request.user);

        self.transport
            .request(
                Method::PUT,
                &item_path(&request.id),
                &[],
                Some(&Value::Object(body)),
                "updateItem",
            )
            .await
    }

    async fn delete_item(&self, request: &DeleteItemRequest) -> Result<Value> {
        let body = (!request.user.is_empty()).then(|| json!({"user": request.user.to_map()}));
        let value = self
            .transport
            .request(
                Method::DELETE,
                &item_path(&request.id),
                &[],
                body.as_ref(),
                "deleteItem",
            )
            .await?;
        // 204 No Content still reports which item went away
        Ok(match value {
            Value::Null => json!({"id": request.id, "deleted": true}),
            other => other,
        })
    }

    async fn poll_task_status(&self, _request: &TaskStatusRequest) -> Result<TaskStatus> {
        Err(unsupported(OperationKind::PollTaskStatus, self.kind()))
    }
}
