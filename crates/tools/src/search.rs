//! Content search across the working tree.
//!
//! Walks the directory, keeps files whose relative path matches
//! `file_pattern`, and reports matching lines as `path:line: text`.

use async_trait::async_trait;
use kestrel_core::error::ToolError;
use kestrel_core::tool::{str_param, Tool, ToolParams};
use regex_lite::Regex;
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

use crate::ToolContext;

/// Matches shown before the remainder is summarized as a count.
const MAX_SHOWN: usize = 50;

pub struct SearchFilesTool {
    ctx: Arc<ToolContext>,
}

impl SearchFilesTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search for text content within files using grep-like functionality"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Text pattern or regex to search for"
                },
                "file_pattern": {
                    "type": "string",
                    "description": "File glob pattern to search within (e.g., '*.py')"
                },
                "directory": {
                    "type": "string",
                    "description": "Directory to search in (defaults to current directory)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, parameters: &ToolParams) -> Result<String, ToolError> {
        let pattern = str_param(parameters, "pattern")?.to_string();
        let file_pattern = parameters
            .get("file_pattern")
            .and_then(|v| v.as_str())
            .unwrap_or("**/*");
        let directory = parameters
            .get("directory")
            .and_then(|v| v.as_str())
            .unwrap_or(".");

        let glob = glob::Pattern::new(file_pattern).map_err(|e| {
            ToolError::InvalidArguments(format!("invalid glob pattern '{file_pattern}': {e}"))
        })?;
        let matcher = LineMatcher::new(&pattern);
        let search_dir = self.ctx.resolve(directory);

        let name = self.name().to_string();
        let results = tokio::task::spawn_blocking(move || search(&search_dir, &glob, &matcher))
            .await
            .map_err(|e| ToolError::failed(&name, e.to_string()))?;

        if results.is_empty() {
            return Ok(format!("No matches found for pattern: {pattern}"));
        }
        let mut out = format!("Found {} matches:\n", results.len());
        out.push_str(&results[..results.len().min(MAX_SHOWN)].join("\n"));
        if results.len() > MAX_SHOWN {
            out.push_str(&format!("\n... and {} more", results.len() - MAX_SHOWN));
        }
        Ok(out)
    }
}

/// A regex when the pattern compiles, otherwise a literal substring.
enum LineMatcher {
    Regex(Regex),
    Literal(String),
}

impl LineMatcher {
    fn new(pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(re) => Self::Regex(re),
            Err(_) => Self::Literal(pattern.to_string()),
        }
    }

    fn is_match(&self, line: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(line),
            Self::Literal(s) => line.contains(s.as_str()),
        }
    }
}

fn search(search_dir: &Path, glob: &glob::Pattern, matcher: &LineMatcher) -> Vec<String> {
    let options = glob::MatchOptions {
        require_literal_separator: true,
        ..glob::MatchOptions::new()
    };
    let mut results = Vec::new();

    let walker = WalkDir::new(search_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != ".git");
    for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(search_dir) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        if !glob.matches_with(&rel, options) {
            continue;
        }
        // Binary or unreadable files are skipped
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        for (idx, line) in content.lines().enumerate() {
            if matcher.is_match(line) {
                results.push(format!("{rel}:{}: {}", idx + 1, line.trim()));
            }
        }
    }
    results
}
