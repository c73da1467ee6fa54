//! Token estimation utilities.
//!
//! Uses a character-based heuristic with a per-provider ratio of
//! characters per token. Close enough for budget decisions on BPE
//! tokenizers (GPT, Claude) and never needs a tokenizer download.

use kestrel_core::message::Message;

/// Fixed cost of a message's role and delimiters.
pub const MESSAGE_OVERHEAD: usize = 2;

/// Estimates tokens for one provider family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenCounter {
    chars_per_token: f64,
}

impl TokenCounter {
    /// Counter tuned for `provider` ("openai", "anthropic", "triton", ...).
    /// Unknown providers use 4 characters per token.
    pub fn for_provider(provider: &str) -> Self {
        let chars_per_token = match provider.to_lowercase().as_str() {
            "anthropic" => 3.8,
            "openai" | "triton" => 4.0,
            _ => 4.0,
        };
        Self { chars_per_token }
    }

    /// Estimate the token count for a string from its character count.
    /// Rounds down.
    pub fn estimate(&self, text: &str) -> usize {
        (text.chars().count() as f64 / self.chars_per_token) as usize
    }

    /// Estimate tokens for a single message including per-message overhead.
    pub fn message_tokens(&self, message: &Message) -> usize {
        self.estimate(&message.content) + MESSAGE_OVERHEAD
    }

    /// Estimate tokens for a slice of messages.
    pub fn messages_tokens(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.message_tokens(m)).sum()
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::for_provider("openai")
    }
}
