//! Configuration loading, validation, and management for Kestrel.
//!
//! Loads configuration from `~/.kestrel/config.toml` with environment
//! variable overrides. Validates all settings at startup.

pub mod permissions;

pub use permissions::{PermissionPolicies, PolicyDecision, PolicyEntry};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.kestrel/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub parallel: ParallelConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub safety: SafetyConfig,
}

/// Which model backend to talk to.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider family: "openai", "anthropic", "triton" or any
    /// OpenAI-compatible name
    #[serde(default = "default_provider")]
    pub name: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL override (e.g. a local server)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider(),
            model: default_model(),
            api_url: None,
            api_key: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Agent loop limits and optional phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_max_tools_per_turn")]
    pub max_tools_per_turn: usize,

    /// Advisory only; recorded in the outcome, never enforced mid-run
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub enable_task_classification: bool,

    #[serde(default = "default_true")]
    pub enable_planning_phase: bool,

    /// Iterations that must pass before a tool-less turn counts as stuck
    #[serde(default = "default_stuck_loop_floor")]
    pub stuck_loop_floor: usize,

    /// Minimum response length for the stuck-loop guard to fire
    #[serde(default = "default_stuck_loop_min_chars")]
    pub stuck_loop_min_chars: usize,

    /// Treat tool-less responses at least this long as complete. Off when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_response_threshold: Option<usize>,
}

fn default_max_iterations() -> usize {
    15
}
fn default_max_tools_per_turn() -> usize {
    5
}
fn default_total_timeout() -> u64 {
    600
}
fn default_stuck_loop_floor() -> usize {
    3
}
fn default_stuck_loop_min_chars() -> usize {
    200
}
fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_tools_per_turn: default_max_tools_per_turn(),
            total_timeout_secs: default_total_timeout(),
            enable_task_classification: true,
            enable_planning_phase: true,
            stuck_loop_floor: default_stuck_loop_floor(),
            stuck_loop_min_chars: default_stuck_loop_min_chars(),
            long_response_threshold: None,
        }
    }
}

/// Tool dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    #[serde(default = "default_true")]
    pub enable_parallel: bool,

    /// Width of the read-only worker pool
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

fn default_max_workers() -> usize {
    3
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enable_parallel: true,
            max_workers: default_max_workers(),
        }
    }
}

/// Context window budgeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Tokens reserved for the model's reply
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: usize,

    #[serde(default = "default_true")]
    pub reserve_output_tokens: bool,

    /// Trim when usage reaches this ratio of the available budget
    #[serde(default = "default_usage_threshold")]
    pub context_usage_threshold: f64,

    /// Summarize when usage reaches this ratio of the available budget
    #[serde(default = "default_summarization_threshold")]
    pub context_summarization_threshold: f64,

    #[serde(default = "default_min_messages_to_keep")]
    pub min_messages_to_keep: usize,

    #[serde(default = "default_context_window")]
    pub default_context_window: usize,

    /// Known window sizes by model name
    #[serde(default = "default_context_windows")]
    pub context_windows: HashMap<String, usize>,

    /// Forces the window size regardless of model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_max_context_override: Option<usize>,

    /// Character cap applied to every tool result
    #[serde(default = "default_max_tool_result_chars")]
    pub max_tool_result_chars: usize,
}

fn default_max_output_tokens() -> usize {
    2048
}
fn default_usage_threshold() -> f64 {
    0.75
}
fn default_summarization_threshold() -> f64 {
    0.85
}
fn default_min_messages_to_keep() -> usize {
    4
}
fn default_context_window() -> usize {
    8192
}
fn default_max_tool_result_chars() -> usize {
    10_000
}

fn default_context_windows() -> HashMap<String, usize> {
    [
        ("gpt-4", 8_192),
        ("gpt-4-32k", 32_768),
        ("gpt-4-turbo", 128_000),
        ("gpt-4o", 128_000),
        ("gpt-3.5-turbo", 16_385),
        ("claude-sonnet-4-5-20250929", 200_000),
        ("claude-opus-4-1-20250805", 200_000),
        ("claude-haiku-4-5-20251001", 200_000),
        ("llm_decoupled", 8_192),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

impl ContextConfig {
    /// Resolve the context window for a model: override, then the known
    /// table, then the default.
    pub fn window_for(&self, model: &str) -> usize {
        self.model_max_context_override
            .or_else(|| self.context_windows.get(model).copied())
            .unwrap_or(self.default_context_window)
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: default_max_output_tokens(),
            reserve_output_tokens: true,
            context_usage_threshold: default_usage_threshold(),
            context_summarization_threshold: default_summarization_threshold(),
            min_messages_to_keep: default_min_messages_to_keep(),
            default_context_window: default_context_window(),
            context_windows: default_context_windows(),
            model_max_context_override: None,
            max_tool_result_chars: default_max_tool_result_chars(),
        }
    }
}

/// Tool execution safety limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,

    #[serde(default = "default_true")]
    pub require_dangerous_command_confirmation: bool,
}

fn default_tool_timeout() -> u64 {
    30
}
fn default_max_file_size_mb() -> u64 {
    10
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout(),
            max_file_size_mb: default_max_file_size_mb(),
            require_dangerous_command_confirmation: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from `KESTREL_CONFIG` or the default path
    /// (~/.kestrel/config.toml), then apply environment overrides:
    /// - `KESTREL_PROVIDER`, `KESTREL_MODEL`, `KESTREL_API_URL`
    /// - `KESTREL_API_KEY`, then the provider's own key variable
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("KESTREL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_path());
        Self::load_at(&path)
    }

    /// Like [`AppConfig::load`] but from an explicit path.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(provider) = std::env::var("KESTREL_PROVIDER") {
            self.provider.name = provider;
        }
        if let Ok(model) = std::env::var("KESTREL_MODEL") {
            self.provider.model = model;
        }
        if let Ok(url) = std::env::var("KESTREL_API_URL") {
            self.provider.api_url = Some(url);
        }
        if self.provider.api_key.is_none() {
            let provider_var = match self.provider.name.as_str() {
                "anthropic" => "ANTHROPIC_API_KEY",
                _ => "OPENAI_API_KEY",
            };
            self.provider.api_key = std::env::var("KESTREL_API_KEY")
                .ok()
                .or_else(|| std::env::var(provider_var).ok());
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".kestrel")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Where persistent per-directory permission decisions live.
    pub fn permissions_path() -> PathBuf {
        Self::config_dir().join("permissions.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be > 0".into(),
            ));
        }
        if self.agent.max_tools_per_turn == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tools_per_turn must be > 0".into(),
            ));
        }
        if self.parallel.max_workers == 0 {
            return Err(ConfigError::ValidationError(
                "parallel.max_workers must be > 0".into(),
            ));
        }

        let ctx = &self.context;
        for (name, value) in [
            ("context_usage_threshold", ctx.context_usage_threshold),
            ("context_summarization_threshold", ctx.context_summarization_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::ValidationError(format!(
                    "context.{name} must be in (0, 1]"
                )));
            }
        }
        if ctx.context_summarization_threshold < ctx.context_usage_threshold {
            return Err(ConfigError::ValidationError(
                "context.context_summarization_threshold must be >= context_usage_threshold".into(),
            ));
        }
        let window = ctx.window_for(&self.provider.model);
        if ctx.reserve_output_tokens && ctx.max_output_tokens >= window {
            return Err(ConfigError::ValidationError(format!(
                "context.max_output_tokens ({}) must be smaller than the context window ({window})",
                ctx.max_output_tokens
            )));
        }

        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Failed to write config file at {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
