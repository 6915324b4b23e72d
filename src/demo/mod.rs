//! Canned conversations and a small client for smoke-testing a running relay.

mod client;

pub use client::{ run_smoke_suite, ClientError, RelayClient, SmokeReport };

use crate::models::chat::Message;

#[derive(Debug, Clone)]
pub struct SampleConversation {
    pub title: &'static str,
    pub messages: Vec<Message>,
}

impl SampleConversation {
    fn single(title: &'static str, content: &str) -> Self {
        Self { title, messages: vec![Message::user(content)] }
    }
}

pub fn sample_conversations() -> Vec<SampleConversation> {
    vec![
        SampleConversation::single("Greeting", "Hello! How can you help me today?"),
        SampleConversation::single("Language switch", "Can you answer me in Spanish?"),
        SampleConversation::single(
            "Introduction",
            "My name is Alex and I'm testing this relay live with two friends."
        ),
        SampleConversation::single("Memory question", "What is my name?"),
        SampleConversation::single(
            "Agent building",
            "Can you help me build an intelligent agent that automates repetitive tasks?"
        ),
        SampleConversation::single(
            "API integration",
            "How can I call your API from a Rust application?"
        )
    ]
}
