use std::time::Duration;

use memu_core::operation::{
    ConversationMessage, DeleteItemRequest, ListRequest, ListTarget, MemorizeRequest,
    MemorizeSource, RetrieveRequest, TaskStatusRequest, UserScope,
};
use memu_core::{ErrorCode, TaskState, WaitOptions, wait_for_task};
use pretty_assertions::assert_eq;
use serde_json::{Map, json};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::common::cloud;

fn message(role: &str, content: &str) -> ConversationMessage {
    ConversationMessage {
        role: role.to_string(),
        content: content.to_string(),
        created_at: None,
    }
}

fn task_body(status: &str) -> serde_json::Value {
    json!({"task_id": "task-42", "status": status})
}

#[tokio::test]
async fn memorize_posts_conversation_with_bearer_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v3/memory/memorize"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_json(json!({
            "conversation": [
                {"role": "user", "content": "I just moved to Lisbon"},
                {"role": "assistant", "content": "Congratulations!"},
            ],
            "user_id": "u-1",
            "agent_id": "a-1",
            "user_name": "Ana",
            "session_date": "2026-03-01",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "task-42",
            "status": "PENDING",
            "message": "Memorization task queued",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = cloud(&server)
        .memorize(&MemorizeRequest {
            source: MemorizeSource::Conversation(vec![
                message("user", "I just moved to Lisbon"),
                message("assistant", "Congratulations!"),
            ]),
            user: UserScope {
                user_name: Some("Ana".to_string()),
                ..UserScope::new("u-1", "a-1")
            },
            session_date: Some("2026-03-01".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(response.task_id.as_deref(), Some("task-42"));
    assert_eq!(response.status.as_deref(), Some("PENDING"));
}

#[tokio::test]
async fn memorize_requires_user_and_agent() {
    let server = MockServer::start().await;

    let err = cloud(&server)
        .memorize(&MemorizeRequest {
            source: MemorizeSource::Conversation(vec![message("user", "hi")]),
            user: UserScope::default(),
            session_date: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn retrieve_sends_latest_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v3/memory/retrieve"))
        .and(body_json(json!({"user_id": "u-1", "agent_id": "a-1", "query": "where do I live"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rewritten_query": "user home city",
            "categories": [{"name": "location", "score": 0.9}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = cloud(&server)
        .retrieve(&RetrieveRequest {
            queries: vec!["hello".to_string(), "where do I live".to_string()],
            filters: Map::new(),
            method: None,
            user: UserScope::new("u-1", "a-1"),
        })
        .await
        .unwrap();
    assert_eq!(response.rewritten_query.as_deref(), Some("user home city"));
    assert_eq!(response.categories.len(), 1);
}

#[tokio::test]
async fn categories_are_listed_by_post() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v3/memory/categories"))
        .and(body_json(json!({"user_id": "u-1", "agent_id": "a-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "categories": [{"name": "food"}, {"name": "travel"}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = cloud(&server)
        .list_items(&ListRequest {
            target: ListTarget::Categories,
            user: UserScope::new("u-1", "a-1"),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(response.categories.len(), 2);
}

#[tokio::test]
async fn item_listing_and_crud_are_not_offered() {
    let server = MockServer::start().await;
    let gateway = cloud(&server);

    let err = gateway
        .list_items(&ListRequest {
            user: UserScope::new("u-1", "a-1"),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    let err = gateway
        .delete_item(&DeleteItemRequest {
            id: "item-1".to_string(),
            user: UserScope::default(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);
    assert!(err.message().contains("deleteItem"));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn poll_reads_task_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/memory/memorize/status/task-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "task-42",
            "status": "SUCCESS",
            "completed_at": "2026-03-01T10:00:00Z",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let status = cloud(&server)
        .poll_task_status(&TaskStatusRequest::new("task-42"))
        .await
        .unwrap();
    assert_eq!(status.status, TaskState::Success);
    assert_eq!(status.completed_at.as_deref(), Some("2026-03-01T10:00:00Z"));
}

#[tokio::test]
async fn wait_polls_until_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/memory/memorize/status/task-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_body("PROCESSING")))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/memory/memorize/status/task-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_body("FAILED")))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = cloud(&server);
    let status = wait_for_task(
        gateway.as_ref(),
        "task-42",
        &WaitOptions {
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        },
    )
    .await
    .unwrap();
    assert_eq!(status.status, TaskState::Failed);
}

#[tokio::test]
async fn wait_times_out_with_last_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/memory/memorize/status/task-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_body("PENDING")))
        .mount(&server)
        .await;

    let gateway = cloud(&server);
    let err = wait_for_task(
        gateway.as_ref(),
        "task-42",
        &WaitOptions {
            interval: Duration::from_millis(20),
            timeout: Duration::from_millis(50),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Timeout);
    assert!(err.message().contains("task-42"));
    assert!(err.message().contains("PENDING"));
}
