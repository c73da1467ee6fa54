//! Caps a single tool result at a character budget.
//!
//! Keeps the first 70% and the last 30% of the budget and replaces the
//! middle with a marker naming the tool, so leading context and trailing
//! errors both survive.

use tracing::debug;

pub const DEFAULT_MAX_RESULT_CHARS: usize = 10_000;

const MARKER_OPEN: &str = "\n\n... [truncated ";
const MARKER_CLOSE: &str = " output] ...\n\n";

#[derive(Debug, Clone, Copy)]
pub struct ResultTruncator {
    max_chars: usize,
}

impl ResultTruncator {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Return `output` unchanged when within budget, otherwise head, marker
    /// and tail. Lengths are counted in characters.
    pub fn truncate(&self, output: &str, tool_name: &str) -> String {
        let len = output.chars().count();
        if len <= self.max_chars || self.already_truncated(output, len) {
            return output.to_string();
        }

        let keep_start = self.max_chars * 7 / 10;
        let keep_end = self.max_chars * 3 / 10;
        let dropped = len - self.max_chars;

        let head: String = output.chars().take(keep_start).collect();
        let tail: String = output.chars().skip(len - keep_end).collect();
        debug!(tool = tool_name, original = len, dropped, "Truncated tool result");

        format!(
            "{head}\n\n... [truncated {dropped} characters from {tool_name} output] ...\n\n{tail}"
        )
    }

    /// True when `output` is a previous truncation whose kept text fits the
    /// budget, so a second pass leaves it alone.
    fn already_truncated(&self, output: &str, len: usize) -> bool {
        let Some(start) = output.find(MARKER_OPEN) else {
            return false;
        };
        let Some(end) = output[start..].find(MARKER_CLOSE) else {
            return false;
        };
        let marker_len = output[start..start + end + MARKER_CLOSE.len()].chars().count();
        len - marker_len <= self.max_chars
    }
}

impl Default for ResultTruncator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RESULT_CHARS)
    }
}
