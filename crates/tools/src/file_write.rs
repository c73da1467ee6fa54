//! File write tool: create or overwrite a file after a permission check.

use async_trait::async_trait;
use kestrel_core::error::ToolError;
use kestrel_core::tool::{str_param, Tool, ToolParams};
use kestrel_security::Operation;
use std::sync::Arc;
use tracing::debug;

use crate::ToolContext;

pub struct WriteFileTool {
    ctx: Arc<ToolContext>,
}

impl WriteFileTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it if it doesn't exist or overwriting if it does"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "The absolute or relative path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write to the file"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, parameters: &ToolParams) -> Result<String, ToolError> {
        let file_path = str_param(parameters, "file_path")?;
        let content = str_param(parameters, "content")?;
        let path = self.ctx.resolve(file_path);

        if !self.ctx.limits.validate_file_size(file_path, content.len() as u64) {
            return Err(ToolError::failed(
                self.name(),
                format!("Content exceeds the {}MB size limit", self.ctx.limits.max_file_size_mb),
            ));
        }

        self.ctx.authorize_file(&path, Operation::WriteFile).await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ToolError::failed(self.name(), format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("Failed to write {file_path}: {e}")))?;

        debug!(path = %path.display(), bytes = content.len(), "File written");
        Ok(format!(
            "Successfully wrote {} characters to {file_path}",
            content.chars().count()
        ))
    }
}
