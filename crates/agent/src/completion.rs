//! Completion detection: decides whether a turn ends the run.
//!
//! Pure classification over the response text. Checks run in a fixed
//! order and the first match wins:
//!
//! 1. explicit sentinel markers (`TASK_COMPLETE`, ...)
//! 2. the iteration ceiling
//! 3. for tool-less turns only: "about to start" phrasing (never done),
//!    then conclusive phrasing, then the optional long-response rule
//! 4. otherwise the run continues

use regex_lite::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Literal strings the model is told to emit when it is finished.
pub const COMPLETION_MARKERS: &[&str] = &["TASK_COMPLETE", "PLAN_COMPLETE", "[COMPLETE]", "[DONE]"];

/// Phrasing that announces work about to begin. A match means "not done"
/// even when conclusive words appear later in the text.
const ABOUT_TO_START: &[&str] = &[
    r"\b(let me|i'll|i will|i'm going to) (start|begin|first|now)\b",
    r"\b(let me|i'll) (read|check|look at|examine|explore|inspect|search)\b",
    r"\b(first|to begin),? (let me|i'll|i will)",
];

/// Phrasing that signals a finished answer.
const CONCLUSIVE: &[&str] = &[
    r"\b(done|completed|finished|ready)\b",
    r"\b(successfully|all set|good to go)\b",
    r"\bhere(?:'s| is) (?:the |a )?(?:summary|result)",
    r"\b(?:task|work|changes) (?:is |are )?(?:complete|done|finished)",
    r"\blet me know if you need",
    r"\bthat(?:'s| should do it)",
    r"\beverything(?:'s| is) (?:set|ready|done)",
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
}

static ABOUT_TO_START_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(ABOUT_TO_START));
static CONCLUSIVE_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(CONCLUSIVE));

/// Why a run stopped (or why it keeps going).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionReason {
    ExplicitMarker(&'static str),
    MaxIterationsReached,
    ConclusiveResponse,
    LongResponse,
    Continuing,
    /// Forced by the loop when tool-less turns stop making progress
    StuckLoop,
    /// The loop ran out of iterations without any completion signal
    MaxIterations,
    GenerationFailed,
    PlanRejected,
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExplicitMarker(marker) => write!(f, "explicit_marker:{marker}"),
            Self::MaxIterationsReached => f.write_str("max_iterations_reached"),
            Self::ConclusiveResponse => f.write_str("conclusive_response"),
            Self::LongResponse => f.write_str("long_response"),
            Self::Continuing => f.write_str("continuing"),
            Self::StuckLoop => f.write_str("stuck_loop"),
            Self::MaxIterations => f.write_str("max_iterations"),
            Self::GenerationFailed => f.write_str("generation_failed"),
            Self::PlanRejected => f.write_str("plan_rejected"),
        }
    }
}

/// Result of a single classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCheck {
    pub done: bool,
    pub reason: CompletionReason,
}

impl CompletionCheck {
    fn done(reason: CompletionReason) -> Self {
        Self { done: true, reason }
    }

    fn continuing() -> Self {
        Self {
            done: false,
            reason: CompletionReason::Continuing,
        }
    }
}

/// Classifies responses. Stateless apart from its tuning knob.
#[derive(Debug, Clone, Default)]
pub struct CompletionDetector {
    /// Tool-less responses at least this long count as finished.
    /// `None` disables the rule.
    long_response_threshold: Option<usize>,
}

impl CompletionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_long_response_threshold(mut self, threshold: Option<usize>) -> Self {
        self.long_response_threshold = threshold;
        self
    }

    pub fn classify(
        &self,
        response: &str,
        had_tool_calls: bool,
        iteration: usize,
        max_iterations: usize,
    ) -> CompletionCheck {
        if let Some(marker) = COMPLETION_MARKERS.iter().find(|m| response.contains(*m)) {
            return CompletionCheck::done(CompletionReason::ExplicitMarker(*marker));
        }

        if iteration >= max_iterations {
            return CompletionCheck::done(CompletionReason::MaxIterationsReached);
        }

        if !had_tool_calls {
            let lower = response.to_lowercase();

            if ABOUT_TO_START_RE.iter().any(|re| re.is_match(&lower)) {
                return CompletionCheck::continuing();
            }
            if CONCLUSIVE_RE.iter().any(|re| re.is_match(&lower)) {
                return CompletionCheck::done(CompletionReason::ConclusiveResponse);
            }
            if let Some(threshold) = self.long_response_threshold
                && response.chars().count() >= threshold
            {
                return CompletionCheck::done(CompletionReason::LongResponse);
            }
        }

        CompletionCheck::continuing()
    }
}
