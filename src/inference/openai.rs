//! Chat-completions transport for review analysis.
//!
//! Sends one review per request and returns the JSON object the model
//! produced. Errors are reported as [`InferenceError`]; the fail-soft
//! wrapping happens in [`crate::inference::InferenceClient`].

use crate::error::InferenceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Performs the network call for a single review.
#[async_trait]
pub trait InferenceTransport: Send + Sync {
    /// Analyze one review text and return the model's JSON answer.
    async fn complete(&self, review_text: &str) -> Result<Value, InferenceError>;
}

/// Process-wide inference settings, injected at construction.
#[derive(Clone)]
pub struct InferenceConfig {
    /// Full chat-completions endpoint URL.
    pub api_url: String,
    pub api_key: Option<String>,
    pub model_name: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl std::fmt::Debug for InferenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model_name", &self.model_name)
            .field("temperature", &self.temperature)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model_name: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Transport backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiTransport {
    config: InferenceConfig,
    http_client: reqwest::Client,
}

impl OpenAiTransport {
    /// Create a transport from the injected configuration.
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| InferenceError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn build_request<'a>(&'a self, review_text: &str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model_name,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_prompt(review_text),
                },
            ],
            temperature: self.config.temperature,
        }
    }
}

#[async_trait]
impl InferenceTransport for OpenAiTransport {
    async fn complete(&self, review_text: &str) -> Result<Value, InferenceError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(InferenceError::MissingCredentials)?;

        let request = self.build_request(review_text);

        let response = self
            .http_client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout(Duration::from_secs(self.config.timeout_seconds))
                } else if e.is_connect() {
                    InferenceError::Transport(format!(
                        "Cannot connect to {}",
                        self.config.api_url
                    ))
                } else {
                    InferenceError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Api { status, body });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| InferenceError::MalformedResponse("No choices returned".to_string()))?;

        debug!("Model answered with {} bytes", content.len());
        parse_content(&content)
    }
}

/// Build the user prompt for one review.
pub fn build_prompt(review_text: &str) -> String {
    format!(
        "Analyze this review: \"{}\". Return valid JSON ONLY with these fields: \
         1. sentiment (Positive, Negative, Neutral) \
         2. confidence_score (0.0 to 1.0) \
         3. summary (max 10 words) \
         4. pros (list of strings) \
         5. cons (list of strings).",
        review_text
    )
}

/// Parse the model's message content into a JSON object.
///
/// Models sometimes wrap the object in a Markdown code fence; the fence is
/// stripped before parsing.
pub fn parse_content(content: &str) -> Result<Value, InferenceError> {
    let trimmed = strip_code_fence(content.trim());

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| InferenceError::MalformedResponse(format!("Content is not JSON: {}", e)))?;

    if !value.is_object() {
        return Err(InferenceError::MalformedResponse(
            "Content is not a JSON object".to_string(),
        ));
    }

    Ok(value)
}

fn strip_code_fence(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

const SYSTEM_PROMPT: &str = "You are a helpful assistant that outputs strictly valid JSON.";
