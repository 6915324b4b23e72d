use log::{ info, error };
use reqwest::{ Client as HttpClient, RequestBuilder, Response };
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use super::SampleConversation;
use crate::llm::DEFAULT_ASI_MODEL;
use crate::models::chat::{ ChatRequest, CompletionSummary, Message };
use crate::server::api::API_KEY_HEADER;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("relay returned {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },
}

/// HTTP client for a running relay.
pub struct RelayClient {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SmokeReport {
    pub health_ok: bool,
    pub passed: usize,
    pub failed: usize,
}

impl SmokeReport {
    pub fn all_passed(&self) -> bool {
        self.health_ok && self.failed == 0
    }
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ClientError> {
        let http = HttpClient::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: DEFAULT_ASI_MODEL.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.header(API_KEY_HEADER, key),
            None => req,
        }
    }

    async fn read_json(resp: Response) -> Result<Value, ClientError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status { status: status.as_u16(), body });
        }
        Ok(resp.json::<Value>().await?)
    }

    pub async fn health(&self) -> Result<Value, ClientError> {
        let resp = self.http.get(self.url("/health")).send().await?;
        Self::read_json(resp).await
    }

    pub async fn send_chat(&self, messages: &[Message]) -> Result<Value, ClientError> {
        let payload = ChatRequest {
            model: Some(self.model.clone()),
            messages: messages.to_vec(),
            conversation_id: None,
        };
        let resp = self.authorize(self.http.post(self.url("/chat")).json(&payload)).send().await?;
        Self::read_json(resp).await
    }

    pub async fn simple_chat(&self, message: &str) -> Result<Value, ClientError> {
        let req = self.http.post(self.url("/simple-chat")).query(&[("message", message)]);
        let resp = self.authorize(req).send().await?;
        Self::read_json(resp).await
    }
}

/// Health check, then every conversation in order with `pause` between them.
pub async fn run_smoke_suite(
    client: &RelayClient,
    conversations: &[SampleConversation],
    pause: Duration
) -> SmokeReport {
    let mut report = SmokeReport::default();
    info!("Starting relay smoke tests against {}", client.base_url);

    match client.health().await {
        Ok(_) => {
            info!("Health check passed");
            report.health_ok = true;
        }
        Err(e) => error!("Health check failed: {}", e),
    }

    let total = conversations.len();
    for (i, conv) in conversations.iter().enumerate() {
        info!("Test {}/{}: {}", i + 1, total, conv.title);

        match client.send_chat(&conv.messages).await {
            Ok(result) => {
                if let Some(reply) = CompletionSummary::from_value(&result).assistant_content() {
                    info!("ASI1 replies: {}", reply);
                }
                info!("Test {} passed", i + 1);
                report.passed += 1;
            }
            Err(e) => {
                error!("Test {} failed: {}", i + 1, e);
                report.failed += 1;
            }
        }

        if !pause.is_zero() && i + 1 < total {
            tokio::time::sleep(pause).await;
        }
    }

    info!("Smoke tests finished: {} passed, {} failed", report.passed, report.failed);
    report
}
