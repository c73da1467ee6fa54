//! Tool types: calls parsed from model output, results fed back, and the
//! executor port the scheduler dispatches through.
//!
//! Tools are what give the agent the ability to act: read and write files,
//! search the tree, run shell commands.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ToolError;

/// Parameters of a tool call. Key order is irrelevant.
pub type ToolParams = serde_json::Map<String, serde_json::Value>;

/// Tools that never mutate state and may run concurrently.
const READ_ONLY_TOOLS: &[&str] = &["read_file", "list_files", "search_files"];

/// Whether a tool may run concurrently with others in the same batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    ReadOnly,
    Mutating,
}

impl ToolCategory {
    /// Classify a tool by name. Anything not on the read-only list is mutating.
    pub fn of(tool_name: &str) -> Self {
        if READ_ONLY_TOOLS.contains(&tool_name) {
            Self::ReadOnly
        } else {
            Self::Mutating
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

/// A request to execute a tool, extracted from model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to execute
    #[serde(rename = "tool")]
    pub name: String,

    #[serde(default)]
    pub parameters: ToolParams,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, parameters: ToolParams) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    pub fn category(&self) -> ToolCategory {
        ToolCategory::of(&self.name)
    }

    /// Fetch a required string parameter.
    pub fn str_param(&self, key: &str) -> Result<&str, ToolError> {
        str_param(&self.parameters, key)
    }
}

/// Fetch a required string parameter from a parameter map.
pub fn str_param<'a>(params: &'a ToolParams, key: &str) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing string parameter '{key}'")))
}

/// The result of one tool call. `output` holds the result text on success
/// and the error text on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    pub success: bool,
    pub output: String,
}

impl ToolExecutionResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: error.into(),
        }
    }
}

impl From<Result<String, ToolError>> for ToolExecutionResult {
    fn from(result: Result<String, ToolError>) -> Self {
        match result {
            Ok(output) => Self::ok(output),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

/// A tool description sent to the model in the system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// The executor port. The scheduler hands every call to one of these.
///
/// Implementations never fail: errors come back as a failed result.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool_name: &str, parameters: &ToolParams) -> ToolExecutionResult;
}

/// A single named capability.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given parameters.
    async fn execute(&self, parameters: &ToolParams) -> Result<String, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A name-keyed set of tools that doubles as a [`ToolExecutor`].
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// All tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, tool_name: &str, parameters: &ToolParams) -> ToolExecutionResult {
        match self.tools.get(tool_name) {
            Some(tool) => tool.execute(parameters).await.into(),
            None => ToolError::NotFound(tool_name.to_string()).into(),
        }
    }
}

impl From<ToolError> for ToolExecutionResult {
    fn from(e: ToolError) -> Self {
        Self::err(e.to_string())
    }
}
