//! Context budget management.
//!
//! Before every model call the loop hands its conversation to
//! [`ContextManager::check_and_manage`], which escalates through three
//! mitigations as usage grows:
//!
//! | Usage of available budget | Action |
//! |---------------------------|--------|
//! | >= summarization threshold | replace the middle with a summary |
//! | >= usage threshold | drop the oldest middle messages down to 60% |
//! | still over budget afterwards | reset to system + continuation note |
//!
//! The system message and the last `min_messages_to_keep` messages are
//! never touched by trimming or summarizing.

use kestrel_config::ContextConfig;
use kestrel_core::message::{Message, Role};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use super::summarizer::Summarizer;
use super::token::TokenCounter;

/// Trimming aims for this share of the available budget.
const TRIM_TARGET_RATIO: f64 = 0.6;

/// Longest quote of the last user message carried through a reset.
const RESET_QUOTE_CHARS: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextAction {
    None,
    Trimmed,
    Summarized,
    EmergencyReset,
}

impl ContextAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Trimmed => "trimmed",
            Self::Summarized => "summarized",
            Self::EmergencyReset => "emergency_reset",
        }
    }
}

impl fmt::Display for ContextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one budget check did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSnapshot {
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub action: ContextAction,
    pub reserved_output_tokens: usize,
}

pub struct ContextManager {
    counter: TokenCounter,
    context_window: usize,
    max_output_tokens: usize,
    reserve_output_tokens: bool,
    usage_threshold: f64,
    summarization_threshold: f64,
    min_messages_to_keep: usize,
    summarizer: Option<Summarizer>,
}

impl ContextManager {
    /// Budget for `model` served by `provider`.
    pub fn new(config: &ContextConfig, provider: &str, model: &str) -> Self {
        Self {
            counter: TokenCounter::for_provider(provider),
            context_window: config.window_for(model),
            max_output_tokens: config.max_output_tokens,
            reserve_output_tokens: config.reserve_output_tokens,
            usage_threshold: config.context_usage_threshold,
            summarization_threshold: config.context_summarization_threshold,
            min_messages_to_keep: config.min_messages_to_keep,
            summarizer: None,
        }
    }

    /// Summarize with a model instead of leaving a plain note.
    pub fn with_summarizer(mut self, summarizer: Summarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn context_window(&self) -> usize {
        self.context_window
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    fn reserved_output_tokens(&self) -> usize {
        if self.reserve_output_tokens {
            self.max_output_tokens
        } else {
            0
        }
    }

    /// Tokens the conversation may occupy.
    pub fn available_tokens(&self) -> usize {
        self.context_window
            .saturating_sub(self.reserved_output_tokens())
            .max(1)
    }

    /// Shrink `messages` in place if needed and report what happened.
    pub async fn check_and_manage(&self, messages: &mut Vec<Message>) -> ContextSnapshot {
        let available = self.available_tokens();
        let tokens_before = self.counter.messages_tokens(messages);
        let ratio = tokens_before as f64 / available as f64;
        let mut action = ContextAction::None;

        if ratio >= self.summarization_threshold {
            if self.summarize(messages).await {
                action = ContextAction::Summarized;
            }
        } else if ratio >= self.usage_threshold {
            let target = (available as f64 * TRIM_TARGET_RATIO) as usize;
            if self.trim(messages, target, tokens_before) {
                action = ContextAction::Trimmed;
            }
        }

        if self.counter.messages_tokens(messages) > available && self.emergency_reset(messages) {
            warn!(available, "Context critically full, conversation reset");
            action = ContextAction::EmergencyReset;
        }

        let snapshot = ContextSnapshot {
            tokens_before,
            tokens_after: self.counter.messages_tokens(messages),
            action,
            reserved_output_tokens: self.reserved_output_tokens(),
        };
        if action != ContextAction::None {
            info!(
                action = %snapshot.action,
                tokens_before = snapshot.tokens_before,
                tokens_after = snapshot.tokens_after,
                window = self.context_window,
                "Managed context"
            );
        }
        snapshot
    }

    /// Index of the first message eligible for removal.
    fn head(messages: &[Message]) -> usize {
        usize::from(messages.first().is_some_and(Message::is_system))
    }

    /// Drop the oldest middle messages until the total fits `target`.
    /// Returns whether anything was dropped.
    fn trim(&self, messages: &mut Vec<Message>, target: usize, tokens_before: usize) -> bool {
        if messages.len() <= self.min_messages_to_keep + 1 {
            return false;
        }
        let head = Self::head(messages);
        let tail_start = messages.len() - self.min_messages_to_keep;
        if tail_start <= head {
            return false;
        }

        let mut total = self.counter.messages_tokens(&messages[..head])
            + self.counter.messages_tokens(&messages[tail_start..]);
        let mut keep_from = tail_start;
        for (idx, msg) in messages[head..tail_start].iter().enumerate().rev() {
            let tokens = self.counter.message_tokens(msg);
            if total + tokens > target {
                break;
            }
            total += tokens;
            keep_from = head + idx;
        }

        let dropped = keep_from - head;
        if dropped == 0 {
            return false;
        }
        messages.drain(head..keep_from);

        let note = Message::user(format!(
            "[Context Note] {dropped} older messages trimmed to manage context."
        ));
        messages.insert(head, note);
        // The note never makes the conversation larger than it was
        if self.counter.messages_tokens(messages) > tokens_before {
            messages.remove(head);
        }
        true
    }

    /// Replace the middle region with a single summary message.
    /// Returns whether the conversation changed.
    async fn summarize(&self, messages: &mut Vec<Message>) -> bool {
        if messages.len() <= self.min_messages_to_keep + 1 {
            return false;
        }
        let head = Self::head(messages);
        let tail_start = messages.len() - self.min_messages_to_keep;
        if tail_start <= head {
            return false;
        }

        let middle = &messages[head..tail_start];
        let middle_tokens = self.counter.messages_tokens(middle);
        let fallback = Message::user(format!(
            "[Context Summary] {} messages were compressed to manage context window limits.",
            middle.len()
        ));

        let summary = match &self.summarizer {
            Some(summarizer) => match summarizer.summarize(middle).await {
                Ok(text) => {
                    let summary = Message::user(format!("[Context Summary]\n{}", text.trim()));
                    if self.counter.message_tokens(&summary) < middle_tokens {
                        summary
                    } else {
                        fallback
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Summarization failed, using plain note");
                    fallback
                }
            },
            None => fallback,
        };

        // A note larger than what it replaces would grow the conversation
        if self.counter.message_tokens(&summary) >= middle_tokens {
            return false;
        }
        messages.splice(head..tail_start, [summary]);
        true
    }

    /// Collapse to the system message plus a note quoting the last user
    /// message. Skipped when the result would not be smaller.
    fn emergency_reset(&self, messages: &mut Vec<Message>) -> bool {
        let system = messages
            .first()
            .filter(|m| m.is_system())
            .cloned()
            .unwrap_or_else(|| Message::system(""));

        let last_user = messages
            .iter()
            .skip(Self::head(messages))
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| quote(&m.content))
            .unwrap_or_else(|| "...".to_string());

        let reset = vec![
            system,
            Message::user(format!(
                "[CONTEXT_RESET] Previous conversation exceeded context limits. \
                 Starting fresh. Last message: {last_user}"
            )),
        ];
        if self.counter.messages_tokens(&reset) >= self.counter.messages_tokens(messages) {
            return false;
        }
        *messages = reset;
        true
    }
}

fn quote(content: &str) -> String {
    if content.chars().count() <= RESET_QUOTE_CHARS {
        return content.to_string();
    }
    let head: String = content.chars().take(RESET_QUOTE_CHARS).collect();
    format!("{head}...")
}
