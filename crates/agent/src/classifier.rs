//! Task complexity classification.
//!
//! One short model call sorts a request into a tier that drives the
//! execution strategy. Any failure falls back to [`Complexity::Simple`].

use kestrel_core::message::Message;
use kestrel_core::model::{GenerateOptions, ModelClient};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Complexity {
    Conversational,
    Simple,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversational => "CONVERSATIONAL",
            Self::Simple => "SIMPLE",
            Self::Complex => "COMPLEX",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "CONVERSATIONAL" => Some(Self::Conversational),
            "SIMPLE" => Some(Self::Simple),
            "COMPLEX" => Some(Self::Complex),
            _ => None,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskClassification {
    pub complexity: Complexity,
    pub reasoning: String,
    pub estimated_tool_calls: u32,
}

impl TaskClassification {
    fn fallback(reasoning: impl Into<String>) -> Self {
        Self {
            complexity: Complexity::Simple,
            reasoning: reasoning.into(),
            estimated_tool_calls: 3,
        }
    }
}

#[derive(Deserialize)]
struct RawClassification {
    complexity: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    estimated_tool_calls: Option<u32>,
}

const CLASSIFIER_PROMPT: &str = r#"You are a task complexity classifier for a coding assistant.

Classify the user's request into exactly one tier.

CONVERSATIONAL: greetings, questions, explanations, creative writing. No files are read or changed. 0 tool calls.
SIMPLE: one file or one clear, well-scoped operation (read a file, create a script, fix a line, list files). 1-5 tool calls.
COMPLEX: several files, refactoring, new features, debugging with uncertain scope. More than 5 tool calls.

Respond with ONLY a JSON object:
{"complexity": "CONVERSATIONAL|SIMPLE|COMPLEX", "reasoning": "brief explanation", "estimated_tool_calls": 0}"#;

pub struct TaskClassifier {
    client: Arc<dyn ModelClient>,
}

impl TaskClassifier {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self { client }
    }

    pub async fn classify(&self, user_message: &str) -> TaskClassification {
        let messages = [Message::system(CLASSIFIER_PROMPT), Message::user(user_message)];
        let options = GenerateOptions::default()
            .with_temperature(0.0)
            .with_max_tokens(200);

        let classification = match self.client.generate(&messages, &options).await {
            Ok(response) => parse_classification(&response).unwrap_or_else(|| {
                warn!("Could not parse task classification, defaulting to SIMPLE");
                TaskClassification::fallback("Parsing failed")
            }),
            Err(e) => {
                warn!(error = %e, "Task classification failed, defaulting to SIMPLE");
                TaskClassification::fallback(format!("Error: {e}"))
            }
        };

        info!(
            complexity = %classification.complexity,
            reasoning = %classification.reasoning,
            "Task classified"
        );
        classification
    }
}

/// Read the outermost `{...}` in `response`, which may be wrapped in a
/// code fence or surrounded by prose.
fn parse_classification(response: &str) -> Option<TaskClassification> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end <= start {
        return None;
    }
    let raw: RawClassification = serde_json::from_str(&response[start..=end]).ok()?;
    let complexity = raw
        .complexity
        .as_deref()
        .and_then(Complexity::parse)
        .unwrap_or(Complexity::Simple);

    Some(TaskClassification {
        complexity,
        reasoning: raw
            .reasoning
            .unwrap_or_else(|| "No reasoning provided".into()),
        estimated_tool_calls: raw.estimated_tool_calls.unwrap_or(0),
    })
}
