//! OpenAI-compatible chat completion client
//!
//! Implements [`TextGenerator`] by making HTTP calls to any OpenAI-compatible
//! API endpoint (OpenAI, Ollama, vLLM, LM Studio, etc.).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ProviderSettings;
use crate::error::{Error, Result};

use super::{ChatMessage, GenerationRequest, TextGenerator};

// ─────────────────────────────────────────────────────────────────
// OpenAI API types (request/response)
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    #[serde(skip_serializing_if = "str::is_empty")]
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

// ─────────────────────────────────────────────────────────────────
// OpenAI Generator
// ─────────────────────────────────────────────────────────────────

/// OpenAI-compatible text generator
pub struct OpenAiGenerator {
    base_url: String,
    api_key: String,
    timeout_secs: u64,
    client: Client,
}

impl OpenAiGenerator {
    /// Create a new generator from provider settings
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::version::build_info().user_agent())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            base_url = %settings.base_url,
            model = %settings.model_id,
            "OpenAI-compatible generator created"
        );

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            timeout_secs: settings.timeout_secs,
            client,
        })
    }

    /// Build the authorization header value (if API key is set)
    fn auth_header(&self) -> Option<String> {
        if self.api_key.is_empty() {
            None
        } else {
            Some(format!("Bearer {}", self.api_key))
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let url = self.completions_url();
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
            response_format: request.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let mut req = self.client.post(&url).json(&body);
        if let Some(ref auth) = self.auth_header() {
            req = req.header("Authorization", auth);
        }

        debug!(model = %request.model, json_mode = request.json_mode, "Sending chat completion");

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::ProviderTimeout {
                    url: url.clone(),
                    timeout_secs: self.timeout_secs,
                }
            } else {
                Error::provider_request(&url, e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ProviderResponse {
                status: Some(status.as_u16()),
                message: format!("API error {}: {}", status, body),
            });
        }

        let parsed: ChatCompletionResponse =
            response.json().await.map_err(|e| Error::ProviderResponse {
                status: Some(status.as_u16()),
                message: format!("Failed to parse API response: {}", e),
            })?;

        let choice = parsed.choices.into_iter().next().ok_or(Error::ProviderResponse {
            status: Some(status.as_u16()),
            message: "No choices in API response".to_string(),
        })?;

        Ok(choice.message.content.unwrap_or_default())
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
