//! Glob-based file listing.

use async_trait::async_trait;
use kestrel_core::error::ToolError;
use kestrel_core::tool::{str_param, Tool, ToolParams};
use std::path::Path;
use std::sync::Arc;

use crate::ToolContext;

pub struct ListFilesTool {
    ctx: Arc<ToolContext>,
}

impl ListFilesTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and directories matching a glob pattern (e.g., '*.py' for current dir, '**/*.py' for recursive, '**/*' for all)"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern to match files (e.g., '*.py', 'src/**/*.ts')"
                },
                "directory": {
                    "type": "string",
                    "description": "Directory to search in (defaults to current directory)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, parameters: &ToolParams) -> Result<String, ToolError> {
        let pattern = str_param(parameters, "pattern")?.to_string();
        let directory = parameters
            .get("directory")
            .and_then(|v| v.as_str())
            .unwrap_or(".");
        let search_dir = self.ctx.resolve(directory);

        let name = self.name().to_string();
        tokio::task::spawn_blocking(move || list_matches(&search_dir, &pattern))
            .await
            .map_err(|e| ToolError::failed(&name, e.to_string()))?
            .map_err(|reason| ToolError::failed(&name, reason))
    }
}

fn list_matches(search_dir: &Path, pattern: &str) -> Result<String, String> {
    let full = search_dir.join(pattern);
    let entries = glob::glob(&full.to_string_lossy())
        .map_err(|e| format!("invalid glob pattern '{pattern}': {e}"))?;

    let mut directories = Vec::new();
    let mut files = Vec::new();
    for path in entries.flatten() {
        let Ok(rel) = path.strip_prefix(search_dir) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        if rel.is_empty() {
            continue;
        }
        if path.is_dir() {
            directories.push(format!("{rel}/"));
        } else if path.is_file() {
            files.push(rel);
        }
    }
    directories.sort();
    files.sort();

    if directories.is_empty() && files.is_empty() {
        return Ok(format!(
            "No files or directories found matching pattern: {pattern}"
        ));
    }

    let mut out = format!(
        "Found {} directories and {} files:\n",
        directories.len(),
        files.len()
    );
    if !directories.is_empty() {
        out.push_str("\nDirectories:\n");
        out.push_str(&directories.join("\n"));
    }
    if !files.is_empty() {
        out.push_str("\n\nFiles:\n");
        out.push_str(&files.join("\n"));
    }
    Ok(out)
}
