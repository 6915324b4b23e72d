//! Shared utilities for the integration tests: a mock ASI1 upstream and an in-process relay.

#![allow(dead_code)]

use asi_chat_relay::llm::{ chat::new_client, LlmConfig };
use asi_chat_relay::server::api::{ router, AppState };
use asi_chat_relay::server::stats::RelayStats;
use axum::{
    body::Bytes,
    extract::State,
    http::{ header::AUTHORIZATION, HeaderMap, StatusCode },
    response::{ IntoResponse, Response },
    routing::post,
    Router,
};
use serde_json::{ json, Value };
use std::net::SocketAddr;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::{ Arc, Mutex };
use std::time::Duration;
use tokio::net::TcpListener;

pub const UPSTREAM_PATH: &str = "/v1/chat/completions";
pub const TEST_API_KEY: &str = "sk-test";

#[derive(Clone)]
pub enum Behavior {
    /// 200 with this JSON body.
    Reply(Value),
    /// Reply with the number of messages received and the last message content.
    Echo,
    /// Arbitrary status and raw body.
    Raw(u16, &'static str),
    /// Sleep before answering 200.
    Delay(Duration),
    /// First call answers with this status, later calls behave like `Echo`.
    FailOnce(u16),
}

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct MockState {
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl MockUpstream {
    pub fn url(&self) -> String {
        format!("http://{}{}", self.addr, UPSTREAM_PATH)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<SeenRequest> {
        self.seen.lock().unwrap().last().cloned()
    }
}

pub fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "asi1-mini",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16 }
    })
}

async fn mock_handler(State(state): State<MockState>, headers: HeaderMap, body: Bytes) -> Response {
    let prior_calls = state.calls.fetch_add(1, Ordering::SeqCst);
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state.seen.lock().unwrap().push(SeenRequest {
        authorization: headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.clone(),
    });

    match state.behavior {
        Behavior::Reply(value) => (StatusCode::OK, axum::Json(value)).into_response(),
        Behavior::FailOnce(status) if prior_calls == 0 => {
            (StatusCode::from_u16(status).unwrap(), "first call fails").into_response()
        }
        Behavior::Echo | Behavior::FailOnce(_) => {
            let messages = body["messages"].as_array().cloned().unwrap_or_default();
            let last = messages
                .last()
                .and_then(|m| m["content"].as_str())
                .unwrap_or_default()
                .to_string();
            let reply = format!("{} message(s); last: {}", messages.len(), last);
            (StatusCode::OK, axum::Json(completion(&reply))).into_response()
        }
        Behavior::Raw(status, text) => {
            let status = StatusCode::from_u16(status).unwrap();
            (status, text).into_response()
        }
        Behavior::Delay(delay) => {
            tokio::time::sleep(delay).await;
            (StatusCode::OK, axum::Json(completion("late"))).into_response()
        }
    }
}

pub async fn start_mock_upstream(behavior: Behavior) -> MockUpstream {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let state = MockState { behavior, calls: calls.clone(), seen: seen.clone() };

    let app = Router::new().route(UPSTREAM_PATH, post(mock_handler)).with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockUpstream { addr, calls, seen }
}

pub fn llm_config(upstream_url: String, timeout: Duration) -> LlmConfig {
    LlmConfig {
        api_key: TEST_API_KEY.to_string(),
        base_url: upstream_url,
        model: "asi1-mini".to_string(),
        timeout,
    }
}

/// Starts the HTTP API against `upstream_url` and returns its address.
pub async fn start_relay(upstream_url: String, timeout: Duration) -> SocketAddr {
    let client = new_client(&llm_config(upstream_url, timeout)).unwrap();
    start_relay_with_state(AppState::new(client, Arc::new(RelayStats::default()))).await
}

pub async fn start_relay_with_state(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
