use memu_core::operation::{
    CreateItemRequest, DeleteItemRequest, ListRequest, ListTarget, MemoryType, RetrieveMethod,
    RetrieveRequest, TaskStatusRequest, UpdateItemRequest, UserScope,
};
use memu_core::{Credential, ErrorCode, OperationRequest, RawResponse, RetryConfig};
use std::sync::Arc;
use std::time::Duration;

use memu_core::config::HttpConfig;
use memu_core::{NoopLogger, connect};
use pretty_assertions::assert_eq;
use serde_json::{Map, json};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::common::{RetryCounter, fast_retry, gateway_for, self_hosted};

fn create_request() -> CreateItemRequest {
    CreateItemRequest {
        memory_type: MemoryType::Knowledge,
        content: "Prefers green tea".to_string(),
        categories: vec!["food".to_string()],
        user: UserScope {
            user_id: Some("u-1".to_string()),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn create_item_posts_json_without_auth_when_unauthenticated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({
            "memory_type": "knowledge",
            "content": "Prefers green tea",
            "categories": ["food"],
            "user": {"user_id": "u-1"},
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "item-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let created = self_hosted(&server)
        .create_item(&create_request())
        .await
        .unwrap();
    assert_eq!(created, json!({"id": "item-1"}));

    let request = &server.received_requests().await.unwrap()[0];
    assert!(request.headers.get("authorization").is_none());
    let user_agent = request.headers.get("user-agent").unwrap().to_str().unwrap();
    assert!(user_agent.starts_with("memu-workflow-adapter/"));
}

#[tokio::test]
async fn keyed_self_hosted_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("authorization", "Bearer local-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "item-2"})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(Credential::self_hosted(server.uri()).with_api_key("local-key"));
    gateway.create_item(&create_request()).await.unwrap();
}

#[tokio::test]
async fn server_errors_are_retried_then_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(4)
        .mount(&server)
        .await;

    let err = self_hosted(&server)
        .create_item(&create_request())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ServiceError);
    assert_eq!(err.http_status(), Some(500));
}

#[tokio::test]
async fn unreachable_server_is_retried_as_network_error() {
    let retry = fast_retry();
    let counter = Arc::new(RetryCounter::default());
    // Nothing listens on the discard port
    let gateway = connect(
        &Credential::self_hosted("http://127.0.0.1:9"),
        &HttpConfig::default(),
        &retry,
        counter.clone(),
    )
    .unwrap();

    let err = gateway.create_item(&create_request()).await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::NetworkError);
    assert_eq!(err.http_status(), None);
    assert_eq!(counter.retries(), retry.max_retries as usize);
}

#[tokio::test]
async fn slow_server_times_out_as_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "late"}))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let http = HttpConfig {
        timeout_ms: 50,
        ..HttpConfig::default()
    };
    let retry = RetryConfig {
        max_retries: 2,
        ..fast_retry()
    };
    let gateway = connect(
        &Credential::self_hosted(server.uri()),
        &http,
        &retry,
        Arc::new(NoopLogger),
    )
    .unwrap();

    let err = gateway.create_item(&create_request()).await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::NetworkError);
    assert_eq!(err.http_status(), None);
    assert!(err.message().contains("timed out"));
}

#[tokio::test]
async fn unauthorized_is_attempted_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "bad key"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = self_hosted(&server)
        .create_item(&create_request())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AuthFailed);
}

#[tokio::test]
async fn rejected_payload_surfaces_server_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "detail": [{"loc": ["body", "memory_type"], "msg": "unknown memory type"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = self_hosted(&server)
        .create_item(&create_request())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);
    assert!(err.message().contains("unknown memory type"));
}

#[tokio::test]
async fn retrieve_sends_queries_filter_and_method() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/retrieve"))
        .and(body_json(json!({
            "queries": [{"role": "user", "content": {"text": "what tea do I like"}}],
            "where": {"category": "food", "user_id": "u-1"},
            "method": "rag",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "needs_retrieval": true,
            "items": [{"id": "item-1", "score": 0.87}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut filters = Map::new();
    filters.insert("category".to_string(), json!("food"));
    let response = self_hosted(&server)
        .retrieve(&RetrieveRequest {
            queries: vec!["what tea do I like".to_string()],
            filters,
            method: Some(RetrieveMethod::Rag),
            user: UserScope {
                user_id: Some("u-1".to_string()),
                ..Default::default()
            },
        })
        .await
        .unwrap();
    assert_eq!(response.needs_retrieval, Some(true));
    assert_eq!(response.items[0]["score"], json!(0.87));
}

#[tokio::test]
async fn list_items_passes_limit_and_scope_as_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("limit", "10"))
        .and(query_param("user_id", "u-1"))
        .and(query_param("memory_type", "profile"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": "a"}, {"id": "b"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let response = self_hosted(&server)
        .list_items(&ListRequest {
            target: ListTarget::Items,
            limit: Some(10),
            filters: [("memory_type".to_string(), "profile".to_string())].into(),
            user: UserScope {
                user_id: Some("u-1".to_string()),
                ..Default::default()
            },
        })
        .await
        .unwrap();
    assert_eq!(response.items.len(), 2);
    assert!(response.categories.is_empty());
}

#[tokio::test]
async fn update_sends_only_changed_fields() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/items/item-1"))
        .and(body_json(json!({"content": "Prefers oolong"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "item-1"})))
        .expect(1)
        .mount(&server)
        .await;

    self_hosted(&server)
        .update_item(&UpdateItemRequest {
            id: "item-1".to_string(),
            content: Some("Prefers oolong".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_with_empty_body_reports_deleted_id() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/items/item-9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let raw = self_hosted(&server)
        .execute(&OperationRequest::DeleteItem(DeleteItemRequest {
            id: "item-9".to_string(),
            user: UserScope::default(),
        }))
        .await
        .unwrap();
    assert_eq!(raw, RawResponse::Other(json!({"id": "item-9", "deleted": true})));
}

#[tokio::test]
async fn missing_item_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/items/nope"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Item not found"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = self_hosted(&server)
        .delete_item(&DeleteItemRequest {
            id: "nope".to_string(),
            user: UserScope::default(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
    assert_eq!(err.http_status(), Some(404));
}

#[tokio::test]
async fn task_polling_is_not_offered() {
    let server = MockServer::start().await;

    let err = self_hosted(&server)
        .poll_task_status(&TaskStatusRequest::new("task-1"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_request_never_reaches_server() {
    let server = MockServer::start().await;

    let err = self_hosted(&server)
        .execute(&OperationRequest::CreateItem(CreateItemRequest {
            content: String::new(),
            ..create_request()
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);
    assert!(server.received_requests().await.unwrap().is_empty());
}
