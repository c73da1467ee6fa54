//! Directory creation tool.

use async_trait::async_trait;
use kestrel_core::error::ToolError;
use kestrel_core::tool::{str_param, Tool, ToolParams};
use kestrel_security::Operation;
use std::sync::Arc;

use crate::ToolContext;

pub struct CreateDirectoryTool {
    ctx: Arc<ToolContext>,
}

impl CreateDirectoryTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for CreateDirectoryTool {
    fn name(&self) -> &str {
        "create_directory"
    }

    fn description(&self) -> &str {
        "Create a new directory"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path of the directory to create"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, parameters: &ToolParams) -> Result<String, ToolError> {
        let raw = str_param(parameters, "path")?;
        let path = self.ctx.resolve(raw);

        self.ctx
            .authorize_file(&path, Operation::CreateDirectory)
            .await?;

        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("Failed to create {raw}: {e}")))?;
        Ok(format!("Created directory: {}", path.display()))
    }
}
