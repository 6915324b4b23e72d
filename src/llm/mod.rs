pub mod chat;

use std::time::Duration;

use crate::cli::Args;

pub const DEFAULT_ASI_API_URL: &str = "https://api.asi1.ai/v1/chat/completions";
pub const DEFAULT_ASI_MODEL: &str = "asi1-mini";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_ASI_API_URL.to_string(),
            model: DEFAULT_ASI_MODEL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&Args> for LlmConfig {
    fn from(args: &Args) -> Self {
        Self {
            api_key: args.asi_api_key.trim().to_string(),
            base_url: args.asi_api_url.clone(),
            model: args.asi_model.clone(),
            timeout: Duration::from_secs(args.asi_timeout_secs),
        }
    }
}
