mod memory;

pub use memory::MemoryHistoryStore;

use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use crate::cli::Args;
use crate::error::RelayError;
use crate::models::chat::{ Conversation, Message };

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn add_message(&self, conversation_id: &str, message: Message) -> Result<(), RelayError>;

    /// The last `limit` messages of the conversation, oldest first.
    async fn get_conversation(
        &self,
        conversation_id: &str,
        limit: usize
    ) -> Result<Conversation, RelayError>;

    async fn clear_conversation(&self, conversation_id: &str) -> Result<(), RelayError>;

    async fn conversation_count(&self) -> usize;
}

pub fn initialize_history_store(args: &Args) -> Arc<dyn HistoryStore> {
    info!("WebSocket conversations kept in memory, last {} messages each", args.history_limit);
    Arc::new(MemoryHistoryStore::new(args.history_limit))
}

pub fn to_messages(conversation: &Conversation) -> Vec<Message> {
    conversation.messages
        .iter()
        .map(|m| Message { role: m.role.clone(), content: m.content.clone() })
        .collect()
}
