//! Model-backed compression of older conversation turns.

use kestrel_core::error::ModelError;
use kestrel_core::message::Message;
use kestrel_core::model::{GenerateOptions, ModelClient};
use std::sync::Arc;
use tracing::debug;

const SUMMARY_MAX_TOKENS: u32 = 500;

const SUMMARIZER_SYSTEM_PROMPT: &str =
    "You are a conversation summarizer. Create concise summaries.";

pub struct Summarizer {
    client: Arc<dyn ModelClient>,
}

impl Summarizer {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self { client }
    }

    /// Summarize `messages` into a short text block.
    pub async fn summarize(&self, messages: &[Message]) -> Result<String, ModelError> {
        let prompt = Self::prompt(messages);
        let options = GenerateOptions::default().with_max_tokens(SUMMARY_MAX_TOKENS);
        debug!(messages = messages.len(), "Summarizing conversation segment");
        self.client.generate(&prompt, &options).await
    }

    fn prompt(messages: &[Message]) -> Vec<Message> {
        let transcript = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        vec![
            Message::system(SUMMARIZER_SYSTEM_PROMPT),
            Message::user(format!(
                "Summarize this conversation segment in under 500 tokens, focusing on key \
                 decisions, code changes, and important context:\n\n{transcript}"
            )),
        ]
    }
}
