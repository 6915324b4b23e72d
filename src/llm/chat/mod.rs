pub mod asi1;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::LlmConfig;
use self::asi1::Asi1ChatClient;
use crate::error::RelayError;
use crate::models::chat::{ ChatRequest, CompletionSummary };

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends the conversation upstream and returns the completion JSON untouched.
    async fn complete(&self, request: &ChatRequest) -> Result<Value, RelayError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> String;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, RelayError> {
    let client = Asi1ChatClient::from_config(config)?;
    Ok(Arc::new(client))
}

/// Text of the first assistant choice in a completion.
pub fn assistant_reply(completion: &Value) -> Result<String, RelayError> {
    CompletionSummary::from_value(completion)
        .assistant_content()
        .map(str::to_string)
        .ok_or_else(|| RelayError::InvalidResponse("No response from ASI1 API".to_string()))
}
