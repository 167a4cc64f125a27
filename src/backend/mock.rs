//! Scripted text generator for tests and offline runs
//!
//! Replies are consumed in order; once the script is exhausted the
//! fallback reply (if any) is returned for every further call.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};

use super::{GenerationRequest, TextGenerator};

/// One scripted reply
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this raw text
    Text(String),
    /// Fail the call with a provider error carrying this message
    Fail(String),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }

    /// A well-formed two-field response object
    pub fn response(text: &str, key_events: &[&str]) -> Self {
        let body = serde_json::json!({
            "ResponseText": text,
            "NewHistoricalKeyEvents": key_events,
        });
        MockReply::Text(body.to_string())
    }
}

/// Mock implementation of [`TextGenerator`]
pub struct MockGenerator {
    script: Mutex<VecDeque<MockReply>>,
    fallback: Option<MockReply>,
    latency: Duration,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockGenerator {
    /// Create a generator that answers with the given replies in order
    pub fn new(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            fallback: None,
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Generator that always returns the same reply
    pub fn always(reply: MockReply) -> Self {
        Self::new([]).with_fallback(reply)
    }

    pub fn with_fallback(mut self, reply: MockReply) -> Self {
        self.fallback = Some(reply);
        self
    }

    /// Simulate a slow endpoint
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Append more replies to the script
    pub fn push(&self, reply: MockReply) {
        self.script.lock().push_back(reply);
    }

    /// Number of calls made so far
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Copies of every request received, in call order
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().push(request.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let reply = self.script.lock().pop_front().or_else(|| self.fallback.clone());
        match reply {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Fail(message)) => Err(Error::provider_request("mock://", message)),
            None => Err(Error::ProviderResponse {
                status: None,
                message: "mock script exhausted".to_string(),
            }),
        }
    }
}
