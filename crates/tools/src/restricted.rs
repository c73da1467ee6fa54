//! Read-only executor used while planning.
//!
//! Only read-only tools and non-mutating shell commands get through; every
//! other call fails without reaching the wrapped executor.

use async_trait::async_trait;
use kestrel_core::tool::{ToolCategory, ToolExecutionResult, ToolExecutor, ToolParams};
use std::sync::Arc;
use tracing::debug;

/// Substrings that make a shell command off-limits during planning.
const BLOCKED_COMMAND_PARTS: &[&str] = &[
    "rm ", "mv ", "cp ", "chmod", "chown", "sudo", "> ", ">>", "|", "git push", "git commit",
];

pub struct RestrictedToolExecutor {
    inner: Arc<dyn ToolExecutor>,
}

impl RestrictedToolExecutor {
    pub fn new(inner: Arc<dyn ToolExecutor>) -> Self {
        Self { inner }
    }

    fn check(tool_name: &str, parameters: &ToolParams) -> Result<(), String> {
        if ToolCategory::of(tool_name).is_read_only() {
            return Ok(());
        }
        if tool_name != "run_bash" {
            return Err(format!(
                "Tool '{tool_name}' is not allowed during planning (read-only mode)"
            ));
        }
        let command = parameters
            .get("command")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        match BLOCKED_COMMAND_PARTS.iter().find(|p| command.contains(*p)) {
            Some(part) => Err(format!(
                "Command contains '{}' which is not allowed during planning",
                part.trim()
            )),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ToolExecutor for RestrictedToolExecutor {
    async fn execute(&self, tool_name: &str, parameters: &ToolParams) -> ToolExecutionResult {
        if let Err(reason) = Self::check(tool_name, parameters) {
            debug!(tool = tool_name, %reason, "Blocked during planning");
            return ToolExecutionResult::err(reason);
        }
        self.inner.execute(tool_name, parameters).await
    }
}
