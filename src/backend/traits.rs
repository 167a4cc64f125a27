//! Text generation trait definitions
//!
//! The generation engine only ever talks to a [`TextGenerator`]; the HTTP
//! client and the scripted mock both sit behind it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ─────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One call to the text generation collaborator
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Model identifier (empty lets the endpoint pick its default)
    pub model: String,

    pub messages: Vec<ChatMessage>,

    pub frequency_penalty: Option<f32>,

    pub presence_penalty: Option<f32>,

    pub temperature: Option<f32>,

    /// Ask the endpoint for a JSON object response
    pub json_mode: bool,
}

impl GenerationRequest {
    /// Total characters of all message contents
    pub fn prompt_chars(&self) -> u64 {
        self.messages.iter().map(|m| m.content.chars().count() as u64).sum()
    }
}

// ─────────────────────────────────────────────────────────────────
// TextGenerator Trait
// ─────────────────────────────────────────────────────────────────

/// An opaque request/response text generation service.
///
/// Implementations must not retry on their own; the generation engine owns
/// the retry budget.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Backend name (e.g., "openai", "mock")
    fn name(&self) -> &str;

    /// Run one generation and return the raw response text
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Type alias for a shared generator reference
pub type SharedGenerator = Arc<dyn TextGenerator>;

// ─────────────────────────────────────────────────────────────────
// Usage Accounting
// ─────────────────────────────────────────────────────────────────

/// Running character counters for one provider configuration
#[derive(Debug, Default)]
pub struct ProviderUsage {
    characters_sent: RwLock<u64>,
    characters_received: RwLock<u64>,
}

impl ProviderUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self, chars: u64) {
        *self.characters_sent.write() += chars;
    }

    pub fn record_received(&self, chars: u64) {
        *self.characters_received.write() += chars;
    }

    pub fn characters_sent(&self) -> u64 {
        *self.characters_sent.read()
    }

    pub fn characters_received(&self) -> u64 {
        *self.characters_received.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = ChatMessage::system("hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"hi"}"#);
    }

    #[test]
    fn test_prompt_chars_counts_all_messages() {
        let request = GenerationRequest {
            messages: vec![ChatMessage::system("abc"), ChatMessage::user("de")],
            ..Default::default()
        };
        assert_eq!(request.prompt_chars(), 5);
    }

    #[test]
    fn test_usage_accumulates() {
        let usage = ProviderUsage::new();
        usage.record_sent(10);
        usage.record_sent(5);
        usage.record_received(7);
        assert_eq!(usage.characters_sent(), 15);
        assert_eq!(usage.characters_received(), 7);
    }
}
