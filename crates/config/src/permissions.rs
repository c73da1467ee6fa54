//! Persistent permission policy file (`~/.kestrel/permissions.toml`).
//!
//! Stores "always allow" / "never allow" decisions keyed by directory and
//! operation. The file is small and re-read on every check so edits made by
//! another session or by hand take effect immediately.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyDecision {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub directory: String,
    pub operation: String,
    pub decision: PolicyDecision,
}

/// All persisted decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionPolicies {
    #[serde(default, rename = "rule")]
    pub rules: Vec<PolicyEntry>,
}

impl PermissionPolicies {
    /// Load from disk. A missing file means no decisions.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |reason: String| ConfigError::WriteError {
            path: path.to_path_buf(),
            reason,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| write_err(e.to_string()))
    }

    pub fn lookup(&self, directory: &str, operation: &str) -> Option<PolicyDecision> {
        self.rules
            .iter()
            .find(|r| r.directory == directory && r.operation == operation)
            .map(|r| r.decision)
    }

    /// Record a decision, replacing any earlier one for the same key.
    pub fn set(&mut self, directory: &str, operation: &str, decision: PolicyDecision) {
        match self
            .rules
            .iter_mut()
            .find(|r| r.directory == directory && r.operation == operation)
        {
            Some(rule) => rule.decision = decision,
            None => self.rules.push(PolicyEntry {
                directory: directory.to_string(),
                operation: operation.to_string(),
                decision,
            }),
        }
    }
}
