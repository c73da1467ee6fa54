//! The orchestration engine: the iteration loop that alternates model
//! generation and tool execution until a task is done.
//!
//! One iteration:
//!
//! 1. **Budget** the conversation against the model's context window
//! 2. **Generate** a streamed reply
//! 3. **Parse** tool calls from the reply
//! 4. **Decide** whether the run is complete
//! 5. **Dispatch** the calls (reads in parallel, writes in order) and feed
//!    the truncated results back as the next user message
//!
//! [`TurnRunner`] wraps the loop with task classification, a per-tier
//! execution strategy and an optional read-only planning phase.

pub mod classifier;
pub mod completion;
pub mod context;
pub mod loop_runner;
pub mod parser;
pub mod planning;
pub mod scheduler;
pub mod strategy;
pub mod stream_event;
pub mod turn;

pub use classifier::{Complexity, TaskClassification, TaskClassifier};
pub use completion::{CompletionCheck, CompletionDetector, CompletionReason, COMPLETION_MARKERS};
pub use context::{
    ContextAction, ContextManager, ContextSnapshot, ResultTruncator, Summarizer, TokenCounter,
};
pub use loop_runner::{AgentLoop, ExecutionOutcome};
pub use parser::{parse_tool_calls, ToolCallParser};
pub use planning::{PlanApprover, PlanDecision, PlanningPhase};
pub use scheduler::ToolScheduler;
pub use strategy::{ExecutionStrategy, ModelTier};
pub use stream_event::AgentStreamEvent;
pub use turn::{TurnReport, TurnRunner};
