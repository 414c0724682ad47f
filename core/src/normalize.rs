//! Response normalizer
//!
//! Turns transport errors into [`ClassifiedError`]s and typed API responses
//! into the uniform success envelope handed back to the workflow host.
//! Neither direction can fail.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};

use crate::error::{ApiError, ClassifiedError, ErrorCode};
use crate::operation::{
    ListResponse, MemorizeResponse, OperationKind, RawResponse, RetrieveResponse,
};

/// Longest server-provided detail copied into a user-facing message
const MAX_DETAIL_LEN: usize = 200;

/// Map a transport failure to a stable code and a user-safe message.
pub fn classify_error(err: &ApiError) -> ClassifiedError {
    if let ApiError::InvalidConfig(reason) = err {
        return ClassifiedError::validation(format!("Invalid request configuration: {reason}"));
    }
    if let ApiError::Parse { status, message } = err {
        return ClassifiedError::new(
            ErrorCode::UnexpectedError,
            format!(
                "The memU API answered with HTTP {status} but the body could not be read: {}",
                truncate_detail(message)
            ),
            Some(*status),
        );
    }

    let detail = match err {
        ApiError::ApiResponse { message, .. } => Some(truncate_detail(message)),
        _ => None,
    }
    .filter(|d| !d.is_empty());

    let status = err.status();
    let (code, message) = match status {
        None => (ErrorCode::NetworkError, network_message(err)),
        Some(401) => (
            ErrorCode::AuthFailed,
            "Authentication failed. Check the memU API key.".to_string(),
        ),
        Some(403) => (
            ErrorCode::AccessDenied,
            "Access denied. The API key is not allowed to perform this operation.".to_string(),
        ),
        Some(404) => (
            ErrorCode::NotFound,
            "The requested memory resource was not found.".to_string(),
        ),
        Some(422) => (
            ErrorCode::ValidationError,
            match &detail {
                Some(detail) => format!("The memU API rejected the request: {detail}"),
                None => "The memU API rejected the request.".to_string(),
            },
        ),
        Some(429) => (
            ErrorCode::RateLimited,
            "Rate limit exceeded. Lower the batch concurrency or try again later.".to_string(),
        ),
        Some(status @ 500..=599) => (
            ErrorCode::ServiceError,
            format!("The memU service failed (HTTP {status}). Try again later."),
        ),
        Some(status) => (
            ErrorCode::UnexpectedError,
            match &detail {
                Some(detail) => format!("API_ERROR: request failed with status {status}: {detail}"),
                None => format!("API_ERROR: request failed with status {status}"),
            },
        ),
    };

    ClassifiedError::new(code, message, status)
}

fn network_message(err: &ApiError) -> String {
    match err {
        ApiError::Network(source) if source.is_timeout() => {
            "The request to the memU API timed out.".to_string()
        }
        ApiError::Network(source) if source.is_connect() => {
            "Could not connect to the memU API. Check the base URL.".to_string()
        }
        _ => "A network error occurred while calling the memU API.".to_string(),
    }
}

fn truncate_detail(detail: &str) -> String {
    let detail = detail.trim();
    match detail.char_indices().nth(MAX_DETAIL_LEN) {
        Some((cut, _)) => format!("{}…", &detail[..cut]),
        None => detail.to_string(),
    }
}

/// A shaped success, ready to be merged over the input record
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResponse {
    operation: OperationKind,
    timestamp: DateTime<Utc>,
    fields: Map<String, Value>,
}

impl NormalizedResponse {
    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Kind-specific fields, without the envelope
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// `{operation, timestamp, success: true, ...fields}`
    pub fn to_json(&self) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("operation".to_string(), json!(self.operation.as_str()));
        out.insert(
            "timestamp".to_string(),
            json!(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        out.insert("success".to_string(), Value::Bool(true));
        out.extend(self.fields.clone());
        out
    }

    /// The input record with the envelope laid on top of it.
    pub fn merge_into(&self, record: &Map<String, Value>) -> Map<String, Value> {
        let mut merged = record.clone();
        merged.extend(self.to_json());
        merged
    }
}

/// Shape a raw response for `kind`, stamped with the current time.
pub fn shape_success(raw: &RawResponse, kind: OperationKind) -> NormalizedResponse {
    shape_success_at(raw, kind, Utc::now())
}

/// Same as [`shape_success`] with an explicit timestamp.
pub fn shape_success_at(
    raw: &RawResponse,
    kind: OperationKind,
    timestamp: DateTime<Utc>,
) -> NormalizedResponse {
    let fields = match (kind, raw) {
        (OperationKind::Memorize, RawResponse::Memorize(resp)) => memorize_fields(resp),
        (OperationKind::Retrieve, RawResponse::Retrieve(resp)) => retrieve_fields(resp),
        (OperationKind::ListItems, RawResponse::List(resp)) => list_fields(resp),
        (_, other) => generic_fields(other),
    };
    NormalizedResponse {
        operation: kind,
        timestamp,
        fields,
    }
}

fn memorize_fields(resp: &MemorizeResponse) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("items_count".to_string(), json!(resp.items.len()));
    fields.insert("categories_count".to_string(), json!(resp.categories.len()));
    fields.insert("resources_count".to_string(), json!(resp.resources.len()));
    fields.insert("items".to_string(), Value::Array(resp.items.clone()));
    fields.insert("categories".to_string(), Value::Array(resp.categories.clone()));
    fields.insert("resources".to_string(), Value::Array(resp.resources.clone()));
    if let Some(resource) = &resp.resource {
        fields.insert("resource".to_string(), resource.clone());
    }
    if let Some(task_id) = &resp.task_id {
        fields.insert("task_id".to_string(), json!(task_id));
    }
    if let Some(status) = &resp.status {
        fields.insert("status".to_string(), json!(status));
    }
    if let Some(message) = &resp.message {
        fields.insert("message".to_string(), json!(message));
    }
    fields
}

fn retrieve_fields(resp: &RetrieveResponse) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(needs_retrieval) = resp.needs_retrieval {
        fields.insert("needs_retrieval".to_string(), json!(needs_retrieval));
    }
    let queries = [
        ("original_query", &resp.original_query),
        ("rewritten_query", &resp.rewritten_query),
        ("next_step_query", &resp.next_step_query),
    ];
    for (key, value) in queries {
        if let Some(value) = value {
            fields.insert(key.to_string(), json!(value));
        }
    }
    fields.insert("categories_count".to_string(), json!(resp.categories.len()));
    fields.insert("items_count".to_string(), json!(resp.items.len()));
    fields.insert("resources_count".to_string(), json!(resp.resources.len()));
    fields.insert("categories".to_string(), Value::Array(resp.categories.clone()));
    fields.insert("items".to_string(), Value::Array(resp.items.clone()));
    fields.insert("resources".to_string(), Value::Array(resp.resources.clone()));
    fields
}

fn list_fields(resp: &ListResponse) -> Map<String, Value> {
    let total = resp
        .total_count
        .unwrap_or((resp.items.len() + resp.categories.len()) as u64);
    let mut fields = Map::new();
    fields.insert("total_count".to_string(), json!(total));
    fields.insert("items".to_string(), Value::Array(resp.items.clone()));
    fields.insert("categories".to_string(), Value::Array(resp.categories.clone()));
    fields
}

fn generic_fields(raw: &RawResponse) -> Map<String, Value> {
    let data = match raw {
        RawResponse::Other(value) => value.clone(),
        RawResponse::Memorize(resp) => serde_json::to_value(resp).unwrap_or_default(),
        RawResponse::Retrieve(resp) => serde_json::to_value(resp).unwrap_or_default(),
        RawResponse::List(resp) => serde_json::to_value(resp).unwrap_or_default(),
    };
    let mut fields = Map::new();
    fields.insert("data".to_string(), data);
    fields
}
