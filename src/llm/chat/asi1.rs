use async_trait::async_trait;
use log::{ info, error };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::Serialize;
use serde_json::Value;
use url::Url;

use super::ChatClient;
use crate::error::RelayError;
use crate::llm::LlmConfig;
use crate::models::chat::{ preview, ChatRequest, CompletionSummary, Message };

const LOG_PREVIEW_CHARS: usize = 100;

pub struct Asi1ChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct Asi1ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
}

impl Asi1ChatClient {
    pub fn new(
        api_key: &str,
        model: String,
        base_url: String,
        timeout: std::time::Duration
    ) -> Result<Self, RelayError> {
        let parsed = Url::parse(&base_url).map_err(|e|
            RelayError::Config(format!("Invalid ASI1 API URL '{}': {}", base_url, e))
        )?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RelayError::Config(format!("ASI1 API URL must be http(s): {}", base_url)));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e|
            RelayError::Config(format!("Invalid API key format: {}", e))
        )?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            model,
            base_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, RelayError> {
        if config.api_key.trim().is_empty() {
            return Err(RelayError::Config("ASI1 API key is required (set ASI_API_KEY)".to_string()));
        }

        Self::new(&config.api_key, config.model.clone(), config.base_url.clone(), config.timeout)
    }

    fn log_completion(completion: &Value) {
        let summary = CompletionSummary::from_value(completion);
        if let Some(content) = summary.assistant_content() {
            info!("ASI1 response: {}", preview(content, LOG_PREVIEW_CHARS));
        }
        if let Some(usage) = &summary.usage {
            info!(
                "Tokens - Prompt: {:?}, Completion: {:?}, Total: {:?}",
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.total_tokens
            );
        }
    }
}

#[async_trait]
impl ChatClient for Asi1ChatClient {
    async fn complete(&self, request: &ChatRequest) -> Result<Value, RelayError> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        info!("Model: {}", model);
        info!("Messages: {}", request.messages.len());
        if let Some(last) = request.messages.last() {
            info!("{}: {}", last.role, preview(&last.content, LOG_PREVIEW_CHARS));
        }

        let payload = Asi1ChatRequest {
            model,
            messages: &request.messages,
            conversation_id: request.conversation_id.as_deref(),
        };

        info!("Sending request to ASI1.AI...");
        let resp = self.http.post(&self.base_url).json(&payload).send().await.map_err(|e| {
            let err = RelayError::from(e);
            error!("{}", err);
            err
        })?;

        let status = resp.status();
        info!("Response received - Status: {}", status.as_u16());

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("ASI1.AI API Error: {} - {}", status.as_u16(), body);
            return Err(RelayError::Upstream { status: status.as_u16(), body });
        }

        let bytes = resp.bytes().await?;
        let completion: Value = serde_json::from_slice(&bytes).map_err(|e| {
            error!("Undecodable ASI1 response body: {}", e);
            RelayError::InvalidResponse(e.to_string())
        })?;

        Self::log_completion(&completion);
        Ok(completion)
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> String {
        self.base_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn payload_omits_absent_conversation_id() {
        let messages = vec![Message::user("hi")];
        let payload = Asi1ChatRequest { model: "asi1-mini", messages: &messages, conversation_id: None };
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["model"], "asi1-mini");
        assert_eq!(value["messages"][0]["role"], "user");
        assert!(value.get("conversation_id").is_none());
    }

    #[test]
    fn rejects_non_http_urls() {
        let err = Asi1ChatClient::new(
            "sk",
            "asi1-mini".into(),
            "ftp://example.com".into(),
            Duration::from_secs(1)
        ).err().unwrap();
        assert!(matches!(err, RelayError::Config(_)));

        let err = Asi1ChatClient::new("sk", "asi1-mini".into(), "not a url".into(), Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn from_config_keeps_model_and_url() {
        let config = LlmConfig {
            api_key: "sk-test".into(),
            base_url: "http://127.0.0.1:9/v1/chat/completions".into(),
            model: "asi1-extended".into(),
            timeout: Duration::from_secs(5),
        };
        let client = Asi1ChatClient::from_config(&config).unwrap();

        assert_eq!(client.get_model(), "asi1-extended");
        assert_eq!(client.get_base_url(), "http://127.0.0.1:9/v1/chat/completions");
    }
}
