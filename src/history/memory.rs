use async_trait::async_trait;
use chrono::Utc;
use std::collections::{ HashMap, VecDeque };
use tokio::sync::RwLock;

use super::HistoryStore;
use crate::error::RelayError;
use crate::models::chat::{ ChatMessage, Conversation, Message };

/// Keeps at most `max_messages` per conversation; older entries fall off the front.
pub struct MemoryHistoryStore {
    conversations: RwLock<HashMap<String, VecDeque<ChatMessage>>>,
    max_messages: usize,
}

impl MemoryHistoryStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            max_messages: max_messages.max(1),
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn add_message(&self, conversation_id: &str, message: Message) -> Result<(), RelayError> {
        let mut conversations = self.conversations.write().await;
        let messages = conversations.entry(conversation_id.to_string()).or_default();
        messages.push_back(ChatMessage {
            role: message.role,
            content: message.content,
            timestamp: Utc::now().timestamp(),
        });
        while messages.len() > self.max_messages {
            messages.pop_front();
        }
        Ok(())
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
        limit: usize
    ) -> Result<Conversation, RelayError> {
        let conversations = self.conversations.read().await;
        let messages = conversations
            .get(conversation_id)
            .map(|msgs| {
                let skip = msgs.len().saturating_sub(limit);
                msgs.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default();

        Ok(Conversation {
            id: conversation_id.to_string(),
            messages,
        })
    }

    async fn clear_conversation(&self, conversation_id: &str) -> Result<(), RelayError> {
        self.conversations.write().await.remove(conversation_id);
        Ok(())
    }

    async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }
}
