//! ModelClient trait: the abstraction over language-model backends.
//!
//! A model client turns a list of messages into text, either streamed as
//! chunks or returned whole. Wire protocols stay behind this trait; the
//! agent loop only ever sees text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ModelError;
use crate::message::Message;

/// A stream of text chunks produced by [`ModelClient::generate_streaming`].
pub type TextStream = mpsc::Receiver<Result<String, ModelError>>;

/// Sampling options for a single generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_temperature() -> f32 {
    0.7
}

impl GenerateOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: None,
            stop: Vec::new(),
        }
    }
}

/// The core ModelClient trait.
///
/// Every backend implements this trait. The agent loop, the summarizer and
/// the task classifier call it without knowing which provider is behind it.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Provider family, e.g. "openai", "anthropic". Selects the
    /// characters-per-token ratio used for budget estimates.
    fn provider_name(&self) -> &str;

    /// The model currently in use.
    fn model_name(&self) -> String;

    /// Switch models for subsequent calls. Clients that cannot switch ignore it.
    fn set_model(&self, _model: &str) {}

    /// Start a streamed generation. Chunks arrive in order; an `Err` item
    /// ends the stream.
    async fn generate_streaming(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<TextStream, ModelError>;

    /// Generate a complete response.
    ///
    /// Default implementation drains `generate_streaming()`.
    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<String, ModelError> {
        let mut rx = self.generate_streaming(messages, options).await?;
        let mut text = String::new();
        while let Some(chunk) = rx.recv().await {
            text.push_str(&chunk?);
        }
        Ok(text)
    }

    /// Health check: can we reach the backend?
    async fn is_healthy(&self) -> bool {
        true
    }
}
