//! Anthropic native model client.
//!
//! Uses the Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as a top-level field
//! - Streaming via SSE `content_block_delta` / `text_delta` events

use async_trait::async_trait;
use kestrel_core::error::ModelError;
use kestrel_core::message::{Message, Role};
use kestrel_core::model::{GenerateOptions, ModelClient, TextStream};
use serde::Serialize;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, trace};

use crate::sse::{error_for_status, spawn_text_stream, SseEvent};

const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicClient {
    base_url: String,
    api_key: String,
    model: RwLock<String>,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: ANTHROPIC_BASE_URL.into(),
            api_key: api_key.into(),
            model: RwLock::new(model.into()),
            client,
        })
    }

    /// Use a custom base URL (e.g., a proxy).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Anthropic takes the system prompt as a top-level field. Multiple
    /// system messages are joined.
    fn request_body(&self, messages: &[Message], options: &GenerateOptions) -> MessagesRequest {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        MessagesRequest {
            model: self.model_name(),
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages: messages
                .iter()
                .filter(|m| m.role != Role::System)
                .map(|m| ApiMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: options.temperature,
            stop_sequences: options.stop.clone(),
            stream: true,
        }
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> String {
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_model(&self, model: &str) {
        *self.model.write().unwrap_or_else(PoisonError::into_inner) = model.to_string();
    }

    async fn generate_streaming(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<TextStream, ModelError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.request_body(messages, options);
        debug!(provider = "anthropic", model = %body.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout(e.to_string())
                } else {
                    ModelError::Network(e.to_string())
                }
            })?;
        let response = error_for_status(response, "anthropic").await?;

        Ok(spawn_text_stream(response, parse_event))
    }

    async fn is_healthy(&self) -> bool {
        let url = format!("{}/v1/models", self.base_url);
        match self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(provider = "anthropic", error = %e, "Health check failed");
                false
            }
        }
    }
}

/// Parse one SSE payload from the Messages API.
fn parse_event(data: &str) -> Option<SseEvent> {
    let event: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            trace!(error = %e, data, "Ignoring unparseable Anthropic SSE");
            return None;
        }
    };

    match event["type"].as_str().unwrap_or("") {
        "content_block_delta" if event["delta"]["type"] == "text_delta" => event["delta"]["text"]
            .as_str()
            .map(|t| SseEvent::Text(t.to_string())),
        "message_stop" => Some(SseEvent::Done),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AnthropicClient {
        AnthropicClient::new("sk-ant-test", "claude-sonnet-4-5-20250929", Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn constructor_with_base_url() {
        let c = client().with_base_url("http://localhost:8080/");
        assert_eq!(c.base_url, "http://localhost:8080");
        assert_eq!(c.provider_name(), "anthropic");
    }

    #[test]
    fn system_prompt_extracted() {
        let c = client();
        let body = c.request_body(
            &[
                Message::system("You are helpful"),
                Message::user("Hello"),
                Message::assistant("Hi"),
            ],
            &GenerateOptions::default(),
        );
        assert_eq!(body.system.as_deref(), Some("You are helpful"));
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, "user");
        assert_eq!(body.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn no_system_prompt() {
        let body = client().request_body(&[Message::user("Hi")], &GenerateOptions::default());
        assert!(body.system.is_none());
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("system").is_none());
    }

    #[test]
    fn parse_text_delta() {
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}"#;
        assert_eq!(parse_event(data), Some(SseEvent::Text("Hel".into())));
    }

    #[test]
    fn parse_other_events() {
        assert_eq!(parse_event(r#"{"type":"message_stop"}"#), Some(SseEvent::Done));
        assert_eq!(parse_event(r#"{"type":"ping"}"#), None);
        assert_eq!(
            parse_event(r#"{"type":"content_block_delta","delta":{"type":"input_json_delta","partial_json":"{"}}"#),
            None
        );
    }
}
