//! File edit tool: replace the first occurrence of a string in a file.

use async_trait::async_trait;
use kestrel_core::error::ToolError;
use kestrel_core::tool::{str_param, Tool, ToolParams};
use kestrel_security::Operation;
use std::sync::Arc;

use crate::ToolContext;

/// How much of a missing `old_string` to echo back in the error.
const MISSING_PREVIEW_CHARS: usize = 100;

pub struct EditFileTool {
    ctx: Arc<ToolContext>,
}

impl EditFileTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit a file by replacing a specific string with new content"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "The path to the file to edit"
                },
                "old_string": {
                    "type": "string",
                    "description": "The exact string to find and replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "The new string to replace with"
                }
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, parameters: &ToolParams) -> Result<String, ToolError> {
        let file_path = str_param(parameters, "file_path")?;
        let old_string = str_param(parameters, "old_string")?;
        let new_string = str_param(parameters, "new_string")?;
        let path = self.ctx.resolve(file_path);

        if !path.is_file() {
            return Err(ToolError::failed(self.name(), format!("File not found: {file_path}")));
        }

        self.ctx.authorize_file(&path, Operation::EditFile).await?;

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("Failed to read {file_path}: {e}")))?;
        if old_string.is_empty() || !content.contains(old_string) {
            let preview: String = old_string.chars().take(MISSING_PREVIEW_CHARS).collect();
            return Err(ToolError::failed(
                self.name(),
                format!("String not found in file: {preview}..."),
            ));
        }

        let updated = content.replacen(old_string, new_string, 1);
        tokio::fs::write(&path, updated)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("Failed to write {file_path}: {e}")))?;
        Ok(format!("Successfully edited {file_path}"))
    }
}
