//! Workflow node: per-record parameter resolution, batch execution and
//! output shaping.
//!
//! A [`MemoryNode`] takes the host's input items, builds one
//! [`OperationRequest`] per record from its [`NodeParameters`], runs them
//! through [`run_batch`] against a shared gateway and merges each shaped
//! response back over the record it came from.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::batch::{BatchOptions, run_batch};
use crate::error::{BatchError, ClassifiedError, Result};
use crate::gateway::{OperationGateway, WaitOptions, task_status_value, wait_for_task};
use crate::guard::{ConfirmationConfig, ensure_confirmed};
use crate::normalize::shape_success;
use crate::operation::{
    ConversationMessage, CreateItemRequest, DeleteItemRequest, ListRequest, ListTarget,
    MemorizeRequest, MemorizeSource, MemoryType, Modality, OperationKind, OperationRequest,
    RawResponse, RetrieveMethod, RetrieveRequest, TaskStatus, TaskStatusRequest,
    UpdateItemRequest, UserScope,
};

/// Host item convention: a JSON record plus optional binary attachments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeItem {
    pub json: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<Value>,
}

impl NodeItem {
    pub fn new(json: Map<String, Value>) -> Self {
        Self { json, binary: None }
    }

    /// Accept either a `{json, binary?}` item or a bare record.
    ///
    /// Non-object values become a record with a single `value` key.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map)
                if matches!(map.get("json"), Some(Value::Object(_)))
                    && map.keys().all(|k| k == "json" || k == "binary") =>
            {
                let json = match map.remove("json") {
                    Some(Value::Object(json)) => json,
                    _ => Map::new(),
                };
                Self {
                    json,
                    binary: map.remove("binary"),
                }
            }
            Value::Object(map) => Self::new(map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Self::new(map)
            }
        }
    }
}

/// `{ field = "name" }` reads the value from the current record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldRef {
    /// Dotted path into the record, e.g. `"message.text"`
    pub field: String,
}

/// A node parameter: fixed, or looked up per record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Field(FieldRef),
    Literal(Value),
}

impl ParamValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn field(path: impl Into<String>) -> Self {
        Self::Field(FieldRef { field: path.into() })
    }

    /// Resolve against `record`; a missing field or JSON null is `None`.
    pub fn resolve(&self, record: &Map<String, Value>) -> Option<Value> {
        let value = match self {
            Self::Literal(value) => Some(value.clone()),
            Self::Field(FieldRef { field }) => lookup(record, field).cloned(),
        };
        value.filter(|v| !v.is_null())
    }
}

fn lookup<'a>(record: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(list) => list.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Owner of the memory, each part resolvable per record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserParams {
    pub user_id: Option<ParamValue>,
    pub agent_id: Option<ParamValue>,
    pub user_name: Option<ParamValue>,
    pub agent_name: Option<ParamValue>,
}

impl UserParams {
    fn resolve(&self, record: &Map<String, Value>) -> Result<UserScope> {
        Ok(UserScope {
            user_id: optional_string(&self.user_id, record, "user_id")?,
            agent_id: optional_string(&self.agent_id, record, "agent_id")?,
            user_name: optional_string(&self.user_name, record, "user_name")?,
            agent_name: optional_string(&self.agent_name, record, "agent_name")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorizeParams {
    /// Self-hosted: resource the server fetches
    #[serde(default)]
    pub resource_url: Option<ParamValue>,
    #[serde(default)]
    pub modality: Option<ParamValue>,
    /// Cloud: array of `{role, content}` messages (or a JSON string of one)
    #[serde(default)]
    pub conversation: Option<ParamValue>,
    #[serde(default)]
    pub session_date: Option<ParamValue>,
    #[serde(default)]
    pub user: UserParams,
    /// Poll the returned task until it finishes
    #[serde(default)]
    pub wait_for_completion: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrieveParams {
    /// A query string or an array of them
    pub queries: Option<ParamValue>,
    #[serde(default)]
    pub filters: Option<ParamValue>,
    #[serde(default)]
    pub method: Option<ParamValue>,
    #[serde(default)]
    pub user: UserParams,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub target: ListTarget,
    #[serde(default)]
    pub limit: Option<ParamValue>,
    #[serde(default)]
    pub filters: BTreeMap<String, ParamValue>,
    #[serde(default)]
    pub user: UserParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateItemParams {
    pub memory_type: ParamValue,
    pub content: ParamValue,
    /// Array of names or a comma-separated string
    #[serde(default)]
    pub categories: Option<ParamValue>,
    #[serde(default)]
    pub user: UserParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateItemParams {
    pub id: ParamValue,
    #[serde(default)]
    pub memory_type: Option<ParamValue>,
    #[serde(default)]
    pub content: Option<ParamValue>,
    #[serde(default)]
    pub categories: Option<ParamValue>,
    #[serde(default)]
    pub user: UserParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteItemParams {
    pub id: ParamValue,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub user: UserParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusParams {
    pub task_id: ParamValue,
    /// Keep polling until the task is SUCCESS or FAILED
    #[serde(default)]
    pub wait: bool,
}

/// What the node does, tagged by `operation`.
///
/// ```toml
/// operation = "createItem"
/// memory_type = "knowledge"
/// content = { field = "text" }
/// user = { user_id = "u-1" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum NodeParameters {
    Memorize(MemorizeParams),
    Retrieve(RetrieveParams),
    ListItems(ListParams),
    CreateItem(CreateItemParams),
    UpdateItem(UpdateItemParams),
    DeleteItem(DeleteItemParams),
    PollTaskStatus(TaskStatusParams),
}

impl NodeParameters {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Memorize(_) => OperationKind::Memorize,
            Self::Retrieve(_) => OperationKind::Retrieve,
            Self::ListItems(_) => OperationKind::ListItems,
            Self::CreateItem(_) => OperationKind::CreateItem,
            Self::UpdateItem(_) => OperationKind::UpdateItem,
            Self::DeleteItem(_) => OperationKind::DeleteItem,
            Self::PollTaskStatus(_) => OperationKind::PollTaskStatus,
        }
    }

    /// Build the request for one record.
    ///
    /// Deletes are gated here, so an unconfirmed delete never reaches a
    /// gateway.
    pub fn build_request(&self, record: &Map<String, Value>) -> Result<OperationRequest> {
        let request = match self {
            Self::Memorize(params) => OperationRequest::Memorize(MemorizeRequest {
                source: memorize_source(params, record)?,
                user: params.user.resolve(record)?,
                session_date: optional_string(&params.session_date, record, "session_date")?,
            }),
            Self::Retrieve(params) => OperationRequest::Retrieve(RetrieveRequest {
                queries: string_list(&params.queries, record, "queries")?,
                filters: object_param(&params.filters, record, "filters")?,
                method: optional_string(&params.method, record, "method")?
                    .map(|m| m.parse::<RetrieveMethod>())
                    .transpose()?,
                user: params.user.resolve(record)?,
            }),
            Self::ListItems(params) => {
                let mut filters = BTreeMap::new();
                for (key, param) in &params.filters {
                    if let Some(value) = optional_string(&Some(param.clone()), record, key)? {
                        filters.insert(key.clone(), value);
                    }
                }
                OperationRequest::ListItems(ListRequest {
                    target: params.target,
                    limit: limit_param(&params.limit, record)?,
                    filters,
                    user: params.user.resolve(record)?,
                })
            }
            Self::CreateItem(params) => OperationRequest::CreateItem(CreateItemRequest {
                memory_type: required_string(&params.memory_type, record, "memory_type")?
                    .parse::<MemoryType>()?,
                content: required_string(&params.content, record, "content")?,
                categories: string_list(&params.categories, record, "categories")?,
                user: params.user.resolve(record)?,
            }),
            Self::UpdateItem(params) => OperationRequest::UpdateItem(UpdateItemRequest {
                id: required_string(&params.id, record, "id")?,
                memory_type: optional_string(&params.memory_type, record, "memory_type")?
                    .map(|t| t.parse::<MemoryType>())
                    .transpose()?,
                content: optional_string(&params.content, record, "content")?,
                categories: match &params.categories {
                    Some(_) => Some(string_list(&params.categories, record, "categories")?),
                    None => None,
                },
                user: params.user.resolve(record)?,
            }),
            Self::DeleteItem(params) => {
                ensure_confirmed(&params.confirmation, record)?;
                OperationRequest::DeleteItem(DeleteItemRequest {
                    id: required_string(&params.id, record, "id")?,
                    user: params.user.resolve(record)?,
                })
            }
            Self::PollTaskStatus(params) => OperationRequest::PollTaskStatus(
                TaskStatusRequest::new(required_string(&params.task_id, record, "task_id")?),
            ),
        };
        request.validate()?;
        Ok(request)
    }
}

fn memorize_source(params: &MemorizeParams, record: &Map<String, Value>) -> Result<MemorizeSource> {
    if let Some(url) = optional_string(&params.resource_url, record, "resource_url")? {
        let modality = match optional_string(&params.modality, record, "modality")? {
            Some(modality) => modality.parse::<Modality>()?,
            None => Modality::default(),
        };
        return Ok(MemorizeSource::Resource { url, modality });
    }
    let Some(conversation) = params.conversation.as_ref().and_then(|p| p.resolve(record)) else {
        return Err(ClassifiedError::validation(
            "Either resource_url or conversation is required",
        ));
    };
    let conversation = match conversation {
        Value::String(text) => serde_json::from_str::<Value>(&text)
            .ok()
            .filter(Value::is_array)
            .unwrap_or_else(|| json!([{"role": "user", "content": text}])),
        other => other,
    };
    let messages: Vec<ConversationMessage> = serde_json::from_value(conversation).map_err(|e| {
        ClassifiedError::validation(format!(
            "conversation must be an array of {{role, content}} messages: {e}"
        ))
    })?;
    Ok(MemorizeSource::Conversation(messages))
}

/// A scalar parameter as a string; blank strings count as absent.
fn optional_string(
    param: &Option<ParamValue>,
    record: &Map<String, Value>,
    name: &str,
) -> Result<Option<String>> {
    let Some(value) = param.as_ref().and_then(|p| p.resolve(record)) else {
        return Ok(None);
    };
    let text = match value {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => {
            return Err(ClassifiedError::validation(format!(
                "{name} must be a string"
            )));
        }
    };
    Ok(Some(text).filter(|t| !t.trim().is_empty()))
}

fn required_string(param: &ParamValue, record: &Map<String, Value>, name: &str) -> Result<String> {
    optional_string(&Some(param.clone()), record, name)?
        .ok_or_else(|| ClassifiedError::validation(format!("{name} is required")))
}

/// A string, a comma-separated string or an array of strings.
fn string_list(
    param: &Option<ParamValue>,
    record: &Map<String, Value>,
    name: &str,
) -> Result<Vec<String>> {
    match param.as_ref().and_then(|p| p.resolve(record)) {
        None => Ok(Vec::new()),
        Some(Value::Array(entries)) => entries
            .into_iter()
            .filter(|v| !v.is_null())
            .map(|entry| match entry {
                Value::String(text) => Ok(text.trim().to_string()),
                Value::Number(number) => Ok(number.to_string()),
                _ => Err(ClassifiedError::validation(format!(
                    "{name} must only contain strings"
                ))),
            })
            .filter(|entry| !matches!(entry, Ok(text) if text.is_empty()))
            .collect(),
        Some(Value::String(text)) => Ok(text
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()),
        Some(_) => Err(ClassifiedError::validation(format!(
            "{name} must be a string or an array of strings"
        ))),
    }
}

/// A JSON object, or a string holding one.
fn object_param(
    param: &Option<ParamValue>,
    record: &Map<String, Value>,
    name: &str,
) -> Result<Map<String, Value>> {
    match param.as_ref().and_then(|p| p.resolve(record)) {
        None => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(Map::new()),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(ClassifiedError::validation(format!(
                "{name} must be a JSON object"
            ))),
        },
        Some(_) => Err(ClassifiedError::validation(format!(
            "{name} must be a JSON object"
        ))),
    }
}

fn limit_param(param: &Option<ParamValue>, record: &Map<String, Value>) -> Result<Option<u32>> {
    let Some(text) = optional_string(param, record, "limit")? else {
        return Ok(None);
    };
    text.trim()
        .parse::<u32>()
        .map(Some)
        .map_err(|_| ClassifiedError::validation(format!("limit must be a positive integer, got '{text}'")))
}

/// A configured node bound to a gateway.
pub struct MemoryNode {
    gateway: Arc<dyn OperationGateway>,
    parameters: NodeParameters,
    batch: BatchOptions,
    wait: WaitOptions,
}

impl MemoryNode {
    pub fn new(gateway: Arc<dyn OperationGateway>, parameters: NodeParameters) -> Self {
        Self {
            gateway,
            parameters,
            batch: BatchOptions::default(),
            wait: WaitOptions::default(),
        }
    }

    pub fn with_batch_options(mut self, batch: BatchOptions) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_wait_options(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    pub fn parameters(&self) -> &NodeParameters {
        &self.parameters
    }

    /// Run the node over `items`, returning one output item per input item.
    ///
    /// With `continue_on_error` failed records come back as
    /// `{...record, success: false, error}`. Without it the first failure
    /// aborts and is returned as [`BatchError`].
    pub async fn execute(&self, items: Vec<NodeItem>) -> std::result::Result<Vec<NodeItem>, BatchError> {
        let kind = self.parameters.kind();
        tracing::info!(
            operation = kind.as_str(),
            items = items.len(),
            max_concurrency = self.batch.max_concurrency,
            continue_on_error = self.batch.continue_on_error,
            "executing memU node"
        );

        let outcomes = run_batch(
            items,
            |_index, item| {
                let record = item.json.clone();
                async move { self.process(&record).await }
            },
            &self.batch,
        )
        .await?;

        Ok(outcomes
            .into_iter()
            .map(|outcome| {
                let (_, item, result) = outcome.into_parts();
                let json = match result {
                    Ok(json) => json,
                    Err(error) => failure_json(&item.json, &error),
                };
                NodeItem {
                    json,
                    binary: item.binary,
                }
            })
            .collect())
    }

    async fn process(&self, record: &Map<String, Value>) -> Result<Map<String, Value>> {
        let request = self.parameters.build_request(record)?;
        let kind = request.kind();

        let (raw, task_status) = match (&self.parameters, &request) {
            (NodeParameters::PollTaskStatus(params), OperationRequest::PollTaskStatus(req))
                if params.wait =>
            {
                let status = wait_for_task(self.gateway.as_ref(), &req.task_id, &self.wait).await?;
                (RawResponse::Other(task_status_value(&status)?), None)
            }
            (NodeParameters::Memorize(params), _) if params.wait_for_completion => {
                let raw = self.gateway.execute(&request).await?;
                let status = self.await_memorize_task(&raw).await?;
                (raw, status)
            }
            _ => (self.gateway.execute(&request).await?, None),
        };

        let mut json = shape_success(&raw, kind).merge_into(record);
        if let Some(status) = task_status {
            json.insert("task_status".to_string(), task_status_value(&status)?);
        }
        Ok(json)
    }

    async fn await_memorize_task(&self, raw: &RawResponse) -> Result<Option<TaskStatus>> {
        let RawResponse::Memorize(response) = raw else {
            return Ok(None);
        };
        let Some(task_id) = response.task_id.as_deref() else {
            // Self-hosted memorize is synchronous
            return Ok(None);
        };
        wait_for_task(self.gateway.as_ref(), task_id, &self.wait)
            .await
            .map(Some)
    }
}

fn failure_json(record: &Map<String, Value>, error: &ClassifiedError) -> Map<String, Value> {
    let mut json = record.clone();
    json.insert("success".to_string(), Value::Bool(false));
    json.insert("error".to_string(), serde_json::to_value(error).unwrap_or_default());
    json
}
