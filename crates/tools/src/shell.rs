//! Shell tool: run a command in the working directory.
//!
//! Dangerous commands need fresh confirmation, then the permission gate is
//! consulted, then the command runs under the per-tool timeout.

use async_trait::async_trait;
use kestrel_core::error::ToolError;
use kestrel_core::tool::{str_param, Tool, ToolParams};
use kestrel_security::{Operation, PermissionDenied};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::ToolContext;

pub struct RunBashTool {
    ctx: Arc<ToolContext>,
}

impl RunBashTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for RunBashTool {
    fn name(&self) -> &str {
        "run_bash"
    }

    fn description(&self) -> &str {
        "Execute a bash command and return its output"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (defaults to the configured tool timeout)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, parameters: &ToolParams) -> Result<String, ToolError> {
        let command = str_param(parameters, "command")?;
        let timeout = parameters
            .get("timeout")
            .and_then(|v| v.as_u64())
            .map(Duration::from_secs)
            .unwrap_or(self.ctx.limits.tool_timeout);

        self.ctx.gate.check_bash(command).await.map_err(|e| match e {
            PermissionDenied::DangerNotConfirmed { description } => {
                ToolError::DangerousCommandDeclined {
                    command: command.to_string(),
                    description,
                }
            }
            other => crate::denied(Operation::RunBash, other),
        })?;

        debug!(command, timeout_secs = timeout.as_secs(), "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(&self.ctx.working_dir).kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ToolError::failed(self.name(), e.to_string())),
            Err(_) => {
                warn!(command, timeout_secs = timeout.as_secs(), "Command timed out");
                return Err(ToolError::Timeout {
                    tool_name: self.name().to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }
        };

        let code = output.status.code().unwrap_or(-1);
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            text.push_str(&format!("\nSTDERR:\n{stderr}"));
        }
        if code != 0 {
            debug!(command, exit_code = code, "Command exited non-zero");
        }
        Ok(format!("Command: {command}\nExit code: {code}\n\n{text}"))
    }
}
