//! Operation requests and typed API responses
//!
//! One request type per operation kind; [`OperationRequest`] is the tagged
//! union the batch pipeline carries. Responses are decoded into explicit
//! structs with optional fields rather than inspected as loose JSON.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClassifiedError, Result};

/// Named remote actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Memorize,
    Retrieve,
    ListItems,
    CreateItem,
    UpdateItem,
    DeleteItem,
    PollTaskStatus,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memorize => "memorize",
            Self::Retrieve => "retrieve",
            Self::ListItems => "listItems",
            Self::CreateItem => "createItem",
            Self::UpdateItem => "updateItem",
            Self::DeleteItem => "deleteItem",
            Self::PollTaskStatus => "pollTaskStatus",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Memory item categories accepted by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Behavior,
    Event,
    Knowledge,
    Profile,
    Skill,
}

impl MemoryType {
    pub const ALL: [MemoryType; 5] = [
        Self::Behavior,
        Self::Event,
        Self::Knowledge,
        Self::Profile,
        Self::Skill,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Behavior => "behavior",
            Self::Event => "event",
            Self::Knowledge => "knowledge",
            Self::Profile => "profile",
            Self::Skill => "skill",
        }
    }
}

impl FromStr for MemoryType {
    type Err = ClassifiedError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| {
                ClassifiedError::validation(format!(
                    "Invalid memory type '{s}'. Expected one of: behavior, event, knowledge, profile, skill"
                ))
            })
    }
}

/// Resource modality for self-hosted memorize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    #[default]
    Conversation,
    Document,
    Image,
    Video,
    Audio,
}

impl FromStr for Modality {
    type Err = ClassifiedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conversation" => Ok(Self::Conversation),
            "document" => Ok(Self::Document),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            other => Err(ClassifiedError::validation(format!(
                "Invalid modality '{other}'. Expected one of: conversation, document, image, video, audio"
            ))),
        }
    }
}

/// Retrieval strategy on the self-hosted API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrieveMethod {
    Rag,
    Llm,
}

impl FromStr for RetrieveMethod {
    type Err = ClassifiedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rag" => Ok(Self::Rag),
            "llm" => Ok(Self::Llm),
            other => Err(ClassifiedError::validation(format!(
                "Invalid retrieve method '{other}'. Expected 'rag' or 'llm'"
            ))),
        }
    }
}

/// Who the memory belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserScope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
}

impl UserScope {
    pub fn new(user_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            agent_id: Some(agent_id.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none()
            && self.agent_id.is_none()
            && self.user_name.is_none()
            && self.agent_name.is_none()
    }

    /// Scope as a JSON object with only the populated keys
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        let fields = [
            ("user_id", &self.user_id),
            ("agent_id", &self.agent_id),
            ("user_name", &self.user_name),
            ("agent_name", &self.agent_name),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                map.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        map
    }
}

/// One message of a conversation handed to cloud memorize
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// What to memorize
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemorizeSource {
    /// A resource the server fetches itself
    Resource { url: String, modality: Modality },
    /// Inline conversation messages
    Conversation(Vec<ConversationMessage>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorizeRequest {
    pub source: MemorizeSource,
    pub user: UserScope,
    pub session_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveRequest {
    pub queries: Vec<String>,
    /// Server-side `where` filter
    pub filters: Map<String, Value>,
    pub method: Option<RetrieveMethod>,
    pub user: UserScope,
}

/// Which collection a listing reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListTarget {
    #[default]
    Items,
    Categories,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListRequest {
    pub target: ListTarget,
    pub limit: Option<u32>,
    /// Arbitrary key/value filters sent as query parameters
    pub filters: BTreeMap<String, String>,
    pub user: UserScope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateItemRequest {
    pub memory_type: MemoryType,
    pub content: String,
    pub categories: Vec<String>,
    pub user: UserScope,
}

/// Only the populated fields are sent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateItemRequest {
    pub id: String,
    pub memory_type: Option<MemoryType>,
    pub content: Option<String>,
    pub categories: Option<Vec<String>>,
    pub user: UserScope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteItemRequest {
    pub id: String,
    pub user: UserScope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusRequest {
    pub task_id: String,
}

impl TaskStatusRequest {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
        }
    }
}

/// A single remote call, built per input record and consumed once
#[derive(Debug, Clone, PartialEq)]
pub enum OperationRequest {
    Memorize(MemorizeRequest),
    Retrieve(RetrieveRequest),
    ListItems(ListRequest),
    CreateItem(CreateItemRequest),
    UpdateItem(UpdateItemRequest),
    DeleteItem(DeleteItemRequest),
    PollTaskStatus(TaskStatusRequest),
}

impl OperationRequest {
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

    /// Check kind-specific required fields before anything is sent.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Memorize(req) => match &req.source {
                MemorizeSource::Resource { url, .. } => require_non_empty("resource_url", url),
                MemorizeSource::Conversation(messages) if messages.is_empty() => Err(
                    ClassifiedError::validation("Conversation must contain at least one message"),
                ),
                MemorizeSource::Conversation(messages) => messages
                    .iter()
                    .try_for_each(|m| require_non_empty("conversation content", &m.content)),
            },
            Self::Retrieve(req) => {
                if req.queries.iter().all(|q| q.trim().is_empty()) {
                    return Err(ClassifiedError::validation(
                        "At least one non-empty query is required",
                    ));
                }
                Ok(())
            }
            Self::ListItems(req) => match req.limit {
                Some(0) => Err(ClassifiedError::validation("limit must be at least 1")),
                _ => Ok(()),
            },
            Self::CreateItem(req) => require_non_empty("content", &req.content),
            Self::UpdateItem(req) => {
                require_non_empty("id", &req.id)?;
                if let Some(content) = &req.content {
                    require_non_empty("content", content)?;
                }
                if req.memory_type.is_none() && req.content.is_none() && req.categories.is_none()
                {
                    return Err(ClassifiedError::validation(
                        "Update requires at least one of memory_type, content or categories",
                    ));
                }
                Ok(())
            }
            Self::DeleteItem(req) => require_non_empty("id", &req.id),
            Self::PollTaskStatus(req) => require_non_empty("task_id", &req.task_id),
        }
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(ClassifiedError::validation(format!("{field} is required")))
    } else {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

/// Memorize result. Self-hosted servers return the extracted memory
/// synchronously; the cloud API returns a task handle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorizeResponse {
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub categories: Vec<Value>,
    #[serde(default)]
    pub resources: Vec<Value>,
    #[serde(default)]
    pub resource: Option<Value>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Retrieve result; list entries carry their relevance `score`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrieveResponse {
    #[serde(default)]
    pub needs_retrieval: Option<bool>,
    #[serde(default)]
    pub original_query: Option<String>,
    #[serde(default)]
    pub rewritten_query: Option<String>,
    #[serde(default)]
    pub next_step_query: Option<String>,
    #[serde(default)]
    pub categories: Vec<Value>,
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub resources: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub categories: Vec<Value>,
}

/// Lifecycle of an asynchronous memorize task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    #[serde(alias = "pending")]
    Pending,
    #[serde(alias = "processing", alias = "RUNNING", alias = "running")]
    Processing,
    #[serde(alias = "success", alias = "COMPLETED", alias = "completed")]
    Success,
    #[serde(alias = "failed", alias = "FAILURE", alias = "failure")]
    Failed,
    #[serde(other)]
    Unknown,
}

impl TaskState {
    /// Polling stops on these
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub status: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Raw success payload, tagged by the operation that produced it
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    Memorize(MemorizeResponse),
    Retrieve(RetrieveResponse),
    List(ListResponse),
    /// Create/update/delete/task payloads, passed through as-is
    Other(Value),
}
