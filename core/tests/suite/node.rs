use std::time::Duration;

use memu_core::guard::ConfirmationConfig;
use memu_core::node::{DeleteItemParams, MemorizeParams, UserParams};
use memu_core::{BatchOptions, ErrorCode, MemoryNode, NodeItem, NodeParameters, ParamValue, WaitOptions};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::common::{cloud, self_hosted};

fn items(records: Vec<Value>) -> Vec<NodeItem> {
    records.into_iter().map(NodeItem::from_value).collect()
}

fn delete_by_field() -> NodeParameters {
    NodeParameters::DeleteItem(DeleteItemParams {
        id: ParamValue::field("id"),
        confirmation: ConfirmationConfig::field("confirm"),
        user: UserParams::default(),
    })
}

async fn mount_delete(server: &MockServer, id: &str, status: u16) {
    let template = if status == 404 {
        ResponseTemplate::new(404).set_body_json(json!({"detail": "Item not found"}))
    } else {
        ResponseTemplate::new(status).set_body_json(json!({"id": id, "deleted": true}))
    };
    Mock::given(method("DELETE"))
        .and(path(format!("/items/{id}")))
        .respond_with(template)
        .mount(server)
        .await;
}

#[tokio::test]
async fn continue_on_error_keeps_order_and_marks_failures() {
    let server = MockServer::start().await;
    mount_delete(&server, "a", 200).await;
    mount_delete(&server, "b", 404).await;
    mount_delete(&server, "c", 200).await;

    let node = MemoryNode::new(self_hosted(&server), delete_by_field()).with_batch_options(
        BatchOptions::default()
            .with_max_concurrency(2)
            .with_continue_on_error(true),
    );
    let input = vec![
        json!({"json": {"id": "a", "confirm": true}, "binary": {"file": "a.bin"}}),
        json!({"id": "b", "confirm": "yes"}),
        json!({"id": "c", "confirm": "delete"}),
        json!({"id": "d", "confirm": "no"}),
    ];

    let output = node.execute(items(input)).await.unwrap();

    assert_eq!(output.len(), 4);
    let ids: Vec<&Value> = output.iter().map(|item| &item.json["id"]).collect();
    assert_eq!(ids, vec!["a", "b", "c", "d"]);
    let success: Vec<&Value> = output.iter().map(|item| &item.json["success"]).collect();
    assert_eq!(success, vec![&json!(true), &json!(false), &json!(true), &json!(false)]);

    assert_eq!(output[0].json["operation"], json!("deleteItem"));
    assert_eq!(output[0].json["data"], json!({"id": "a", "deleted": true}));
    assert_eq!(output[0].binary, Some(json!({"file": "a.bin"})));

    assert_eq!(
        output[1].json["error"],
        json!({
            "code": "NOT_FOUND",
            "message": "The requested memory resource was not found.",
            "httpStatus": 404,
        })
    );
    assert_eq!(output[3].json["error"]["code"], json!("CONFIRMATION_REQUIRED"));

    // The unconfirmed record never reached the server
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| r.url.path() != "/items/d"));
}

#[tokio::test]
async fn fail_fast_returns_first_error() {
    let server = MockServer::start().await;
    mount_delete(&server, "a", 404).await;
    mount_delete(&server, "b", 200).await;

    let node = MemoryNode::new(self_hosted(&server), delete_by_field())
        .with_batch_options(BatchOptions::sequential());

    let err = node
        .execute(items(vec![
            json!({"id": "a", "confirm": true}),
            json!({"id": "b", "confirm": true}),
        ]))
        .await
        .unwrap_err();

    assert_eq!(err.index(), 0);
    assert_eq!(err.error().code(), ErrorCode::NotFound);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn cloud_memorize_can_wait_for_the_task() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v3/memory/memorize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "task-7",
            "status": "PENDING",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/memory/memorize/status/task-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "task-7",
            "status": "SUCCESS",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let params = NodeParameters::Memorize(MemorizeParams {
        conversation: Some(ParamValue::field("messages")),
        user: UserParams {
            user_id: Some(ParamValue::field("user")),
            agent_id: Some(ParamValue::literal("assistant-1")),
            ..Default::default()
        },
        wait_for_completion: true,
        ..Default::default()
    });
    let node = MemoryNode::new(cloud(&server), params).with_wait_options(WaitOptions {
        interval: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
    });

    let output = node
        .execute(items(vec![json!({
            "user": "u-1",
            "messages": [{"role": "user", "content": "I am vegetarian"}],
        })]))
        .await
        .unwrap();

    let json = &output[0].json;
    assert_eq!(json["success"], json!(true));
    assert_eq!(json["operation"], json!("memorize"));
    assert_eq!(json["task_id"], json!("task-7"));
    assert_eq!(json["task_status"]["status"], json!("SUCCESS"));
    assert_eq!(json["user"], json!("u-1"));
}

#[tokio::test]
async fn params_from_toml_drive_a_retrieve() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/retrieve"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "i-1", "score": 0.8}, {"id": "i-2", "score": 0.4}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let params: NodeParameters = toml::from_str(
        r#"
        operation = "retrieve"
        queries = { field = "question" }
        method = "rag"
        "#,
    )
    .unwrap();
    let output = MemoryNode::new(self_hosted(&server), params)
        .execute(items(vec![json!({"question": "what do I eat"})]))
        .await
        .unwrap();

    let json = &output[0].json;
    assert_eq!(json["items_count"], json!(2));
    assert_eq!(json["items"][1]["score"], json!(0.4));
    assert_eq!(json["question"], json!("what do I eat"));
}
