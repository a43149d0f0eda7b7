//! Claude API Client
//!
//! Anthropic Messages API client used as the engine's [`ModelInvoker`].
//! Rate-limit (429) and overload (529) responses map to
//! [`InvokeError::Throttled`] so the gateway retries them.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::InvokeError;
use crate::providers::ModelInvoker;

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL_ID: &str = "claude-sonnet-4-20250514";

/// Claude API client
#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: Option<String>,
    api_url: String,
    model_id: String,
}

/// Message in conversation
#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// API request
#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

/// API response
#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    r#type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: usize,
    output_tokens: usize,
}

/// Map a non-success HTTP status onto the invoke error taxonomy
pub fn status_error(status: StatusCode, body: &str) -> InvokeError {
    let message = format!("Claude API error {}: {}", status, body);
    match status.as_u16() {
        429 | 529 => InvokeError::Throttled(message),
        _ => InvokeError::Upstream(message),
    }
}

impl ClaudeClient {
    pub fn new(api_key: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.map(|s| s.to_string()),
            api_url: ANTHROPIC_API_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
        }
    }

    /// Create from config
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.anthropic_api_key.as_deref())
            .with_model(&config.model_id)
            .with_api_url(&config.api_url)
    }

    pub fn with_model(mut self, model_id: &str) -> Self {
        self.model_id = model_id.to_string();
        self
    }

    pub fn with_api_url(mut self, url: &str) -> Self {
        self.api_url = url.to_string();
        self
    }

    /// Check if API key is configured
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[async_trait]
impl ModelInvoker for ClaudeClient {
    async fn invoke(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String, InvokeError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            InvokeError::NotConfigured("ANTHROPIC_API_KEY not set - model calls unavailable".to_string())
        })?;

        let request = MessageRequest {
            model: &self.model_id,
            max_tokens,
            temperature,
            messages: vec![Message { role: "user", content: prompt }],
        };

        debug!("Calling Claude API: model={}, prompt_len={}", self.model_id, prompt.len());

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &text));
        }

        let result: MessageResponse = response.json().await?;

        let content = result
            .content
            .into_iter()
            .filter_map(|b| if b.r#type == "text" { b.text } else { None })
            .collect::<Vec<_>>()
            .join("\n");

        if let Some(usage) = result.usage {
            info!(
                "Claude response: model={}, in={}, out={}",
                self.model_id, usage.input_tokens, usage.output_tokens
            );
        }

        Ok(content)
    }

    fn name(&self) -> &str {
        &self.model_id
    }
}
