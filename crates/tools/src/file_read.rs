//! File read tool.

use async_trait::async_trait;
use kestrel_core::error::ToolError;
use kestrel_core::tool::{str_param, Tool, ToolParams};
use std::sync::Arc;

use crate::ToolContext;

pub struct ReadFileTool {
    ctx: Arc<ToolContext>,
}

impl ReadFileTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file from the filesystem"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "The absolute or relative path to the file to read"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, parameters: &ToolParams) -> Result<String, ToolError> {
        let file_path = str_param(parameters, "file_path")?;
        let path = self.ctx.resolve(file_path);

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| ToolError::failed(self.name(), format!("File not found: {file_path}")))?;
        if !metadata.is_file() {
            return Err(ToolError::failed(self.name(), format!("Not a file: {file_path}")));
        }
        if !self.ctx.limits.validate_file_size(file_path, metadata.len()) {
            return Err(ToolError::failed(
                self.name(),
                format!(
                    "File {file_path} exceeds the {}MB size limit",
                    self.ctx.limits.max_file_size_mb
                ),
            ));
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("Failed to read {file_path}: {e}")))?;
        Ok(format!("Content of {file_path}:\n\n{content}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{params, permissive};
    use serde_json::json;

    #[tokio::test]
    async fn reads_relative_to_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi there").unwrap();
        let tool = ReadFileTool::new(permissive(dir.path()));

        let out = tool
            .execute(&params(json!({"file_path": "hello.txt"})))
            .await
            .unwrap();
        assert_eq!(out, "Content of hello.txt:\n\nhi there");
    }

    #[tokio::test]
    async fn missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool::new(permissive(dir.path()));
        let err = tool
            .execute(&params(json!({"file_path": "nope.txt"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("File not found: nope.txt"));
    }

    #[tokio::test]
    async fn missing_argument_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool::new(permissive(dir.path()));
        let err = tool.execute(&params(json!({}))).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
