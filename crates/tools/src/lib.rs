//! Built-in tool implementations for Kestrel.
//!
//! Tools give the agent the ability to work on a source tree: read, write
//! and edit files, list and search them, create directories and run shell
//! commands. Everything that mutates goes through the session's
//! [`PermissionGate`] first.

pub mod directory;
pub mod file_edit;
pub mod file_read;
pub mod file_write;
pub mod list;
pub mod restricted;
pub mod search;
pub mod shell;

use kestrel_core::error::ToolError;
use kestrel_core::tool::{ToolDefinition, ToolRegistry};
use kestrel_security::{resolve_path, Operation, PermissionDenied, PermissionGate, SafetyLimits};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use restricted::RestrictedToolExecutor;

/// State shared by every tool in a session.
pub struct ToolContext {
    pub working_dir: PathBuf,
    pub gate: Arc<PermissionGate>,
    pub limits: SafetyLimits,
}

impl ToolContext {
    pub fn new(gate: Arc<PermissionGate>, limits: SafetyLimits) -> Self {
        Self {
            working_dir: gate.working_dir().to_path_buf(),
            gate,
            limits,
        }
    }

    pub fn resolve(&self, raw: &str) -> PathBuf {
        resolve_path(&self.working_dir, raw)
    }

    /// Ask the gate about a file operation, mapping a refusal to a tool error.
    async fn authorize_file(&self, path: &Path, operation: Operation) -> Result<(), ToolError> {
        self.gate
            .check_file(path, operation)
            .await
            .map_err(|e| denied(operation, e))
    }
}

fn denied(operation: Operation, e: PermissionDenied) -> ToolError {
    ToolError::PermissionDenied {
        tool_name: operation.to_string(),
        reason: e.to_string(),
    }
}

/// Create the registry of local tools. The registry is the session's
/// [`kestrel_core::ToolExecutor`].
pub fn default_registry(ctx: Arc<ToolContext>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(file_read::ReadFileTool::new(ctx.clone())));
    registry.register(Box::new(file_write::WriteFileTool::new(ctx.clone())));
    registry.register(Box::new(file_edit::EditFileTool::new(ctx.clone())));
    registry.register(Box::new(list::ListFilesTool::new(ctx.clone())));
    registry.register(Box::new(search::SearchFilesTool::new(ctx.clone())));
    registry.register(Box::new(shell::RunBashTool::new(ctx.clone())));
    registry.register(Box::new(directory::CreateDirectoryTool::new(ctx)));
    registry
}

/// Render tool definitions as the markdown block used in the system prompt.
pub fn tools_prompt(definitions: &[ToolDefinition]) -> String {
    let mut out = String::new();
    for def in definitions {
        out.push_str(&format!("### {}\n{}\n\n", def.name, def.description));

        let required: Vec<&str> = def.parameters["required"]
            .as_array()
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();
        if let Some(props) = def.parameters["properties"].as_object()
            && !props.is_empty()
        {
            out.push_str("**Parameters:**\n");
            for (name, info) in props {
                let marker = if required.contains(&name.as_str()) {
                    "required"
                } else {
                    "optional"
                };
                let desc = info["description"].as_str().unwrap_or("No description");
                out.push_str(&format!("- `{name}`: {desc} ({marker})\n"));
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A context rooted in `dir` where every write and command is pre-approved.
    pub fn permissive(dir: &Path) -> Arc<ToolContext> {
        let gate = PermissionGate::new(dir.canonicalize().unwrap());
        gate.grant_all_writes();
        gate.grant_all_bash();
        Arc::new(ToolContext::new(Arc::new(gate), SafetyLimits::default()))
    }

    /// A context with no grants and no prompt: every check is denied.
    pub fn locked(dir: &Path) -> Arc<ToolContext> {
        let gate = PermissionGate::new(dir.canonicalize().unwrap());
        Arc::new(ToolContext::new(Arc::new(gate), SafetyLimits::default()))
    }

    pub fn params(value: serde_json::Value) -> kestrel_core::ToolParams {
        value.as_object().cloned().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use kestrel_core::ToolExecutor;
    use serde_json::json;

    #[test]
    fn registry_has_all_tools() {
        let dir = tempfile::tempdir().unwrap();
        let registry = default_registry(permissive(dir.path()));
        assert_eq!(
            registry.names(),
            vec![
                "create_directory",
                "edit_file",
                "list_files",
                "read_file",
                "run_bash",
                "search_files",
                "write_file"
            ]
        );
    }

    #[test]
    fn prompt_lists_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let registry = default_registry(permissive(dir.path()));
        let prompt = tools_prompt(&registry.definitions());
        assert!(prompt.contains("### search_files"));
        assert!(prompt.contains("- `file_pattern`:"));
        assert!(prompt.contains("- `pattern`: Text pattern or regex to search for (required)"));
        assert!(prompt.contains("(optional)"));
    }

    #[tokio::test]
    async fn write_then_read_through_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = default_registry(permissive(dir.path()));

        let written = registry
            .execute(
                "write_file",
                &params(json!({"file_path": "notes/todo.txt", "content": "ship it"})),
            )
            .await;
        assert!(written.success, "{}", written.output);

        let read = registry
            .execute("read_file", &params(json!({"file_path": "notes/todo.txt"})))
            .await;
        assert!(read.success);
        assert!(read.output.ends_with("ship it"));
    }

    #[tokio::test]
    async fn unknown_tool_is_failed_result() {
        let dir = tempfile::tempdir().unwrap();
        let registry = default_registry(permissive(dir.path()));
        let result = registry.execute("teleport", &params(json!({}))).await;
        assert!(!result.success);
        assert_eq!(result.output, "Unknown tool: teleport");
    }
}
