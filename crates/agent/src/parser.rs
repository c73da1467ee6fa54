//! Extracts tool calls from model text.
//!
//! The model is told to emit
//!
//! ````text
//! ```tool_call
//! {"tool": "read_file", "parameters": {"file_path": "src/main.rs"}}
//! ```
//! ````
//!
//! When no fenced block is present, bare `{"tool": ..., "parameters": ...}`
//! objects are accepted as a lower-confidence fallback.

use kestrel_core::tool::{ToolCall, ToolParams};
use regex_lite::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::warn;

/// Signature of a pluggable parser.
pub type ToolCallParser = fn(&str) -> Vec<ToolCall>;

static FENCED: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```tool_call\s*\n(.*?)\n```").ok());

static BARE_START: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"\{\s*"tool"\s*:"#).ok());

/// Parse every tool call in `text`, in order of appearance.
/// Malformed blocks are skipped with a warning.
pub fn parse_tool_calls(text: &str) -> Vec<ToolCall> {
    let mut calls = Vec::new();

    if let Some(fenced) = FENCED.as_ref() {
        for caps in fenced.captures_iter(text) {
            let Some(body) = caps.get(1) else { continue };
            match serde_json::from_str::<ToolCall>(body.as_str().trim()) {
                Ok(call) if !call.name.is_empty() => calls.push(call),
                Ok(_) => warn!("Tool call block has an empty tool name"),
                Err(e) => warn!(error = %e, "Failed to parse tool call block"),
            }
        }
    }

    if calls.is_empty() {
        calls = parse_bare(text);
        if !calls.is_empty() {
            warn!(
                count = calls.len(),
                "Tool call found without a tool_call fence, parsing with lower confidence"
            );
        }
    }

    calls
}

/// Unfenced calls must spell out both keys, so prose that merely mentions
/// a `"tool"` object is not executed.
#[derive(Deserialize)]
struct BareCall {
    tool: String,
    parameters: ToolParams,
}

/// Find unfenced JSON objects that start with a `"tool"` key. Each
/// candidate is read with a streaming deserializer so nested parameter
/// objects are handled.
fn parse_bare(text: &str) -> Vec<ToolCall> {
    let Some(start_re) = BARE_START.as_ref() else {
        return Vec::new();
    };

    let mut calls = Vec::new();
    let mut resume = 0;
    for m in start_re.find_iter(text) {
        if m.start() < resume {
            continue;
        }
        let mut stream =
            serde_json::Deserializer::from_str(&text[m.start()..]).into_iter::<BareCall>();
        match stream.next() {
            Some(Ok(call)) if !call.tool.is_empty() => {
                resume = m.start() + stream.byte_offset();
                calls.push(ToolCall::new(call.tool, call.parameters));
            }
            Some(Err(e)) => warn!(error = %e, "Skipping malformed unfenced tool call"),
            _ => {}
        }
    }
    calls
}
