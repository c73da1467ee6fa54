//! Numeric safety limits: file size, iteration and per-turn tool budgets.

use kestrel_config::{AgentConfig, SafetyConfig};
use std::time::Duration;
use tracing::warn;

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct SafetyLimits {
    pub max_iterations: usize,
    pub max_tools_per_turn: usize,
    pub total_timeout: Duration,
    pub tool_timeout: Duration,
    pub max_file_size_mb: u64,
}

impl SafetyLimits {
    pub fn from_config(agent: &AgentConfig, safety: &SafetyConfig) -> Self {
        Self {
            max_iterations: agent.max_iterations,
            max_tools_per_turn: agent.max_tools_per_turn,
            total_timeout: Duration::from_secs(agent.total_timeout_secs),
            tool_timeout: Duration::from_secs(safety.tool_timeout_secs),
            max_file_size_mb: safety.max_file_size_mb,
        }
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_size_mb * BYTES_PER_MB
    }

    /// True when a file of `size_bytes` is within the limit.
    pub fn validate_file_size(&self, path: &str, size_bytes: u64) -> bool {
        if size_bytes > self.max_file_bytes() {
            warn!(
                path,
                size_mb = size_bytes as f64 / BYTES_PER_MB as f64,
                limit_mb = self.max_file_size_mb,
                "File exceeds size limit"
            );
            return false;
        }
        true
    }

    /// True while `current` is below the iteration ceiling.
    pub fn check_iteration_limit(&self, current: usize) -> bool {
        if current >= self.max_iterations {
            warn!(max_iterations = self.max_iterations, "Max iteration limit reached");
            return false;
        }
        true
    }

    /// True while `current` does not exceed the per-turn tool budget.
    pub fn check_tool_limit(&self, current: usize) -> bool {
        if current > self.max_tools_per_turn {
            warn!(current, max = self.max_tools_per_turn, "Too many tool calls");
            return false;
        }
        true
    }

    /// True once a run has been going longer than the total budget.
    /// The budget is advisory: callers log it and carry on.
    pub fn total_timeout_exceeded(&self, elapsed: Duration) -> bool {
        elapsed > self.total_timeout
    }
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default(), &SafetyConfig::default())
    }
}
