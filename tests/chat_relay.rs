mod common;

use common::{
    closed_addr,
    completion,
    http_client,
    start_mock_upstream,
    start_relay,
    Behavior,
    TEST_API_KEY,
    UPSTREAM_PATH,
};
use serde_json::{ json, Value };
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn chat_returns_upstream_payload_verbatim() {
    let mut upstream_body = completion("Hello! How can I help?");
    upstream_body["system_fingerprint"] = json!("fp-123");
    let upstream = start_mock_upstream(Behavior::Reply(upstream_body.clone())).await;
    let relay = start_relay(upstream.url(), TIMEOUT).await;

    let resp = http_client()
        .post(format!("http://{}/chat", relay))
        .json(
            &json!({
            "model": "asi1-mini",
            "messages": [{ "role": "user", "content": "Hello, how are you?" }],
            "conversation_id": "conv-1"
        })
        )
        .send().await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, upstream_body);

    assert_eq!(upstream.calls(), 1);
    let seen = upstream.last_request().unwrap();
    assert_eq!(seen.authorization.as_deref(), Some(format!("Bearer {}", TEST_API_KEY).as_str()));
    assert_eq!(seen.body["model"], "asi1-mini");
    assert_eq!(seen.body["conversation_id"], "conv-1");
    assert_eq!(seen.body["messages"][0]["content"], "Hello, how are you?");
}

#[tokio::test]
async fn chat_without_model_uses_configured_default() {
    let upstream = start_mock_upstream(Behavior::Reply(completion("ok"))).await;
    let relay = start_relay(upstream.url(), TIMEOUT).await;

    let resp = http_client()
        .post(format!("http://{}/chat", relay))
        .json(&json!({ "messages": [{ "role": "user", "content": "hi" }] }))
        .send().await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let seen = upstream.last_request().unwrap();
    assert_eq!(seen.body["model"], "asi1-mini");
    assert!(seen.body.get("conversation_id").is_none());
}

#[tokio::test]
async fn multi_turn_history_is_forwarded_in_order() {
    let upstream = start_mock_upstream(Behavior::Reply(completion("Your name is Alex."))).await;
    let relay = start_relay(upstream.url(), TIMEOUT).await;

    let messages =
        json!([
        { "role": "user", "content": "My name is Alex" },
        { "role": "assistant", "content": "Nice to meet you, Alex!" },
        { "role": "user", "content": "What is my name?" }
    ]);
    let resp = http_client()
        .post(format!("http://{}/chat", relay))
        .json(&json!({ "messages": messages }))
        .send().await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(upstream.last_request().unwrap().body["messages"], messages);
}

#[tokio::test]
async fn empty_messages_never_reach_upstream() {
    let upstream = start_mock_upstream(Behavior::Reply(completion("unused"))).await;
    let relay = start_relay(upstream.url(), TIMEOUT).await;

    let resp = http_client()
        .post(format!("http://{}/chat", relay))
        .json(&json!({ "messages": [] }))
        .send().await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("messages"));
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn upstream_error_status_is_relayed() {
    let upstream = start_mock_upstream(Behavior::Raw(401, r#"{"error":"invalid key"}"#)).await;
    let relay = start_relay(upstream.url(), TIMEOUT).await;

    let resp = http_client()
        .post(format!("http://{}/chat", relay))
        .json(&json!({ "messages": [{ "role": "user", "content": "hi" }] }))
        .send().await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "ASI1.AI API Error: 401");
}

#[tokio::test]
async fn upstream_server_error_is_relayed() {
    let upstream = start_mock_upstream(Behavior::Raw(500, "boom")).await;
    let relay = start_relay(upstream.url(), TIMEOUT).await;

    let resp = http_client()
        .post(format!("http://{}/chat", relay))
        .json(&json!({ "messages": [{ "role": "user", "content": "hi" }] }))
        .send().await
        .unwrap();

    assert_eq!(resp.status(), 500);
}

#[tokio::test]
async fn slow_upstream_yields_gateway_timeout() {
    let upstream = start_mock_upstream(Behavior::Delay(Duration::from_secs(3))).await;
    let relay = start_relay(upstream.url(), Duration::from_millis(200)).await;

    let resp = http_client()
        .post(format!("http://{}/chat", relay))
        .json(&json!({ "messages": [{ "role": "user", "content": "hi" }] }))
        .send().await
        .unwrap();

    assert_eq!(resp.status(), 504);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "Timeout connecting to ASI1.AI");
}

#[tokio::test]
async fn unreachable_upstream_yields_service_unavailable() {
    let dead = closed_addr().await;
    let relay = start_relay(format!("http://{}{}", dead, UPSTREAM_PATH), TIMEOUT).await;

    let resp = http_client()
        .post(format!("http://{}/chat", relay))
        .json(&json!({ "messages": [{ "role": "user", "content": "hi" }] }))
        .send().await
        .unwrap();

    assert_eq!(resp.status(), 503);
}

#[tokio::test]
async fn non_json_upstream_body_is_bad_gateway() {
    let upstream = start_mock_upstream(Behavior::Raw(200, "<html>maintenance</html>")).await;
    let relay = start_relay(upstream.url(), TIMEOUT).await;

    let resp = http_client()
        .post(format!("http://{}/chat", relay))
        .json(&json!({ "messages": [{ "role": "user", "content": "hi" }] }))
        .send().await
        .unwrap();

    assert_eq!(resp.status(), 502);
}

#[tokio::test]
async fn simple_chat_wraps_message_as_single_user_turn() {
    let upstream = start_mock_upstream(Behavior::Reply(completion("Paris"))).await;
    let relay = start_relay(upstream.url(), TIMEOUT).await;

    let resp = http_client()
        .post(format!("http://{}/simple-chat", relay))
        .query(&[("message", "What is the capital of France?")])
        .send().await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let seen = upstream.last_request().unwrap();
    assert_eq!(
        seen.body["messages"],
        json!([{ "role": "user", "content": "What is the capital of France?" }])
    );
    assert_eq!(seen.body["model"], "asi1-mini");
}

#[tokio::test]
async fn health_and_root_do_not_touch_upstream() {
    let upstream = start_mock_upstream(Behavior::Reply(completion("unused"))).await;
    let relay = start_relay(upstream.url(), TIMEOUT).await;
    let client = http_client();

    let health: Value = client
        .get(format!("http://{}/health", relay))
        .send().await
        .unwrap()
        .json().await
        .unwrap();
    assert_eq!(health["status"], "healthy");

    let root = client.get(format!("http://{}/", relay)).send().await.unwrap();
    assert_eq!(root.status(), 200);

    assert_eq!(upstream.calls(), 0);
}
