//! Live progress events for front ends.
//!
//! The loop forwards model text as it streams in and reports every tool
//! call it dispatches, so a terminal can render a run as it happens.
//! Unlike [`kestrel_core::DomainEvent`], these carry full content.

use serde::{Deserialize, Serialize};

/// Events emitted by the agent loop while it runs.
///
/// - `chunk`       partial text from the model
/// - `tool_call`   a parsed call about to be dispatched
/// - `tool_result` one call finished (payload already truncated)
/// - `dropped`     calls over the per-turn cap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    Chunk { content: String },

    ToolCall {
        name: String,
        parameters: serde_json::Value,
    },

    ToolResult {
        name: String,
        output: String,
        success: bool,
    },

    Dropped { count: usize },
}

impl AgentStreamEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Dropped { .. } => "dropped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_serialization() {
        let event = AgentStreamEvent::ToolCall {
            name: "read_file".into(),
            parameters: serde_json::json!({"file_path": "a.rs"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_call""#));
        assert!(json.contains(r#""name":"read_file""#));
        assert_eq!(event.event_type(), "tool_call");

        let result = AgentStreamEvent::ToolResult {
            name: "run_bash".into(),
            output: "boom".into(),
            success: false,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains(r#""success":false"#));
    }
}
