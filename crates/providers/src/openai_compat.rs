//! OpenAI-compatible model client.
//!
//! Works with: OpenAI, Triton/vLLM OpenAI frontends, Ollama, OpenRouter and
//! any endpoint exposing `/chat/completions` with SSE streaming.
//!
//! Tool calls are carried in the response text (fenced JSON blocks), so
//! only text deltas are read from the stream.

use async_trait::async_trait;
use kestrel_core::error::ModelError;
use kestrel_core::message::Message;
use kestrel_core::model::{GenerateOptions, ModelClient, TextStream};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, trace};

use crate::sse::{error_for_status, spawn_text_stream, SseEvent};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// An OpenAI-compatible model client.
pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    api_key: Option<String>,
    model: RwLock<String>,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: RwLock::new(model.into()),
            client,
        })
    }

    /// OpenAI's hosted API.
    pub fn openai(api_key: Option<String>, model: impl Into<String>) -> Result<Self, ModelError> {
        Self::new("openai", OPENAI_BASE_URL, api_key, model, Duration::from_secs(120))
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn request_body(&self, messages: &[Message], options: &GenerateOptions) -> ChatRequest {
        ChatRequest {
            model: self.model_name(),
            messages: messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stop: options.stop.clone(),
            stream: true,
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    fn provider_name(&self) -> &str {
        &self.name
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
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(messages, options);
        debug!(provider = %self.name, model = %body.model, messages = messages.len(), "Sending streaming request");

        let response = self
            .request(self.client.post(&url))
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
        let response = error_for_status(response, &self.name).await?;

        Ok(spawn_text_stream(response, parse_chunk))
    }

    async fn is_healthy(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        match self.request(self.client.get(&url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(provider = %self.name, error = %e, "Health check failed");
                false
            }
        }
    }
}

/// Parse one SSE payload from `/chat/completions`.
fn parse_chunk(data: &str) -> Option<SseEvent> {
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty())
            .map(SseEvent::Text),
        Err(e) => {
            trace!(data, error = %e, "Ignoring unparseable SSE chunk");
            None
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ApiMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiCompatClient {
        OpenAiCompatClient::openai(Some("sk-test".into()), "gpt-4o").unwrap()
    }

    #[test]
    fn openai_constructor() {
        let c = client();
        assert_eq!(c.provider_name(), "openai");
        assert_eq!(c.model_name(), "gpt-4o");
        assert!(c.base_url.contains("api.openai.com"));
    }

    #[test]
    fn set_model_switches() {
        let c = client();
        c.set_model("gpt-3.5-turbo");
        assert_eq!(c.model_name(), "gpt-3.5-turbo");
    }

    #[test]
    fn request_body_shape() {
        let c = client();
        let body = c.request_body(
            &[Message::system("rules"), Message::user("hi")],
            &GenerateOptions::default().with_max_tokens(500),
        );
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 500);
        assert_eq!(json["stream"], true);
        assert!(json.get("stop").is_none());
    }

    #[test]
    fn parse_content_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        assert_eq!(parse_chunk(data), Some(SseEvent::Text("Hello".into())));
    }

    #[test]
    fn parse_finish_and_empty_deltas() {
        assert_eq!(
            parse_chunk(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#),
            None
        );
        assert_eq!(
            parse_chunk(r#"{"choices":[{"delta":{"content":""}}]}"#),
            None
        );
        assert_eq!(parse_chunk(r#"{"choices":[],"usage":{"total_tokens":3}}"#), None);
    }

    #[test]
    fn parse_done_and_garbage() {
        assert_eq!(parse_chunk("[DONE]"), Some(SseEvent::Done));
        assert_eq!(parse_chunk("not json"), None);
    }
}
