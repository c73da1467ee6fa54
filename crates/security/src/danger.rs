//! Dangerous shell command detection.
//!
//! A deny-list: commands matching none of the patterns are considered safe.
//! Patterns are checked in order and the first match wins, so the more
//! specific variants sit above the general ones.

use regex_lite::Regex;
use std::sync::LazyLock;

/// A destructive command class.
#[derive(Debug)]
pub struct DangerPattern {
    pub regex: Regex,
    pub description: &'static str,
}

const PATTERNS: &[(&str, &str)] = &[
    (r"\brm\s+-rf\s+/", "Recursive delete from root"),
    (r"\brm\s+-rf\s+~", "Recursive delete from home"),
    (r"\brm\s+-rf\s+\*", "Recursive delete all files"),
    (r"\brm\s+-rf", "Recursive force delete"),
    (r"\bsudo\b", "Elevated privileges"),
    (r"\bchmod\s+777", "Overly permissive permissions"),
    (r"\bchmod\s+-R\s+777", "Recursive overly permissive permissions"),
    (r">\s*/dev/", "Writing to device files"),
    (r"\bgit\s+push\s+--force", "Force push to git"),
    (r"\bgit\s+push\s+-f", "Force push to git (short form)"),
    (r"\bmkfs\b", "Format filesystem"),
    (r"\bdd\s+.*of=/dev", "Writing to block device"),
    (r":\(\)\s*\{\s*:\s*\|\s*:\s*&", "Fork bomb"),
    (r"\bcurl\b.*\|\s*(ba)?sh\b", "Pipe curl to bash"),
    (r"\bwget\b.*\|\s*(ba)?sh\b", "Pipe wget to bash"),
    (r"\beval\b.*\$\(", "Eval with command substitution"),
];

/// The ordered pattern table, compiled once.
pub static DANGER_PATTERNS: LazyLock<Vec<DangerPattern>> = LazyLock::new(|| {
    PATTERNS
        .iter()
        .filter_map(|(pattern, description)| {
            match Regex::new(&format!("(?i){pattern}")) {
                Ok(regex) => Some(DangerPattern { regex, description }),
                Err(e) => {
                    tracing::error!(pattern, error = %e, "Invalid danger pattern");
                    None
                }
            }
        })
        .collect()
});

/// Check a shell command against the danger table.
///
/// Returns the description of the first matching pattern, or `None` when
/// the command is considered safe.
pub fn is_dangerous(command: &str) -> Option<&'static str> {
    DANGER_PATTERNS
        .iter()
        .find(|p| p.regex.is_match(command))
        .map(|p| p.description)
}
