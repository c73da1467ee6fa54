//! Read-only planning for complex tasks.
//!
//! The model explores the workspace through a [`RestrictedToolExecutor`]
//! on a copy of the conversation, writes a plan, and the operator decides
//! what happens to it through a [`PlanApprover`].

use async_trait::async_trait;
use kestrel_config::AppConfig;
use kestrel_core::message::{Message, Role};
use kestrel_core::model::{GenerateOptions, ModelClient};
use kestrel_core::tool::ToolExecutor;
use kestrel_tools::RestrictedToolExecutor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::loop_runner::{AgentLoop, ExecutionOutcome};
use crate::stream_event::AgentStreamEvent;

/// Iteration ceiling for the exploration sub-loop.
pub const PLANNING_MAX_ITERATIONS: usize = 10;

const PLANNING_PROMPT: &str = r#"# PLANNING MODE

You are in planning mode. Explore the codebase with read-only tools, design an approach and write a plan. Nothing may be changed yet.

# Available tools (read-only)

- read_file: read file contents
- list_files: list files matching a glob (e.g. "**/*.rs")
- search_files: search file contents with a regex
- run_bash: read-only commands only (ls, find, cat, grep, tree)

write_file, edit_file, create_directory and any mutating shell command will be refused.

# Exploring

Start from the directory structure, then read the manifest files, entry points and the modules the task touches. Use search_files to locate definitions.

```tool_call
{"tool": "list_files", "parameters": {"pattern": "**/*"}}
```

# Plan format

## Implementation Plan

### Overview
[what will be done]

### Steps
1. [first step]
2. [second step]

### Files to Modify
- path: [change]

### Risks
- [concerns]

Say "PLAN_COMPLETE" when the plan is ready."#;

/// The operator's verdict on a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanDecision {
    Approve,
    /// Approve with extra instructions
    Modify(String),
    Reject,
}

/// Shows a plan to the operator and waits for a decision.
#[async_trait]
pub trait PlanApprover: Send + Sync {
    async fn approve(&self, plan: &str) -> PlanDecision;
}

pub struct PlanningPhase {
    client: Arc<dyn ModelClient>,
    executor: Arc<dyn ToolExecutor>,
    config: AppConfig,
    options: GenerateOptions,
    stream: Option<mpsc::UnboundedSender<AgentStreamEvent>>,
}

impl PlanningPhase {
    /// `executor` is wrapped so only read-only calls reach it.
    pub fn new(
        client: Arc<dyn ModelClient>,
        executor: Arc<dyn ToolExecutor>,
        config: &AppConfig,
    ) -> Self {
        Self {
            client,
            executor: Arc::new(RestrictedToolExecutor::new(executor)),
            config: config.clone(),
            options: GenerateOptions::default(),
            stream: None,
        }
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_stream(mut self, tx: mpsc::UnboundedSender<AgentStreamEvent>) -> Self {
        self.stream = Some(tx);
        self
    }

    /// Explore and return the plan text: the last assistant message of the
    /// sub-loop, or an empty string if the model never answered.
    /// `base_messages` is copied, never modified.
    pub async fn plan(&self, task: &str, base_messages: &[Message]) -> (String, ExecutionOutcome) {
        info!("Entering planning mode");

        let mut messages = base_messages.to_vec();
        messages.push(Message::system(PLANNING_PROMPT));
        messages.push(Message::user(format!(
            "Task: {task}\n\nPlease explore the codebase and create an implementation plan."
        )));

        let mut agent = AgentLoop::new(
            Arc::clone(&self.client),
            Arc::clone(&self.executor),
            &self.config,
        )
        .with_max_iterations(PLANNING_MAX_ITERATIONS)
        .with_options(self.options.clone());
        if let Some(tx) = &self.stream {
            agent = agent.with_stream(tx.clone());
        }

        let outcome = agent.run(&mut messages).await;
        let plan = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        info!(
            reason = %outcome.completion_reason,
            iterations = outcome.iteration_count,
            "Planning finished"
        );
        (plan, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionReason;
    use crate::test_support::{RecordingExecutor, ScriptedModel};

    #[tokio::test]
    async fn plan_is_last_assistant_message() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok("```tool_call\n{\"tool\": \"list_files\", \"parameters\": {\"pattern\": \"**/*\"}}\n```".into()),
            Ok("## Implementation Plan\n1. edit lib.rs\nPLAN_COMPLETE".into()),
        ]));
        let executor = Arc::new(RecordingExecutor::default());
        let base = vec![Message::system("sys"), Message::user("refactor the parser")];

        let phase = PlanningPhase::new(model.clone(), executor.clone(), &AppConfig::default());
        let (plan, outcome) = phase.plan("refactor the parser", &base).await;

        assert!(plan.starts_with("## Implementation Plan"));
        assert_eq!(outcome.completion_reason, CompletionReason::ExplicitMarker("PLAN_COMPLETE"));
        assert_eq!(executor.calls(), vec!["list_files".to_string()]);
        assert_eq!(base.len(), 2);

        let first = &model.calls()[0];
        assert_eq!(first.len(), 4);
        assert_eq!(first[2].role, Role::System);
        assert!(first[2].content.starts_with("# PLANNING MODE"));
        assert!(first[3].content.starts_with("Task: refactor the parser"));
    }

    #[tokio::test]
    async fn mutating_tools_are_refused() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok("```tool_call\n{\"tool\": \"write_file\", \"parameters\": {\"file_path\": \"a\", \"content\": \"b\"}}\n```".into()),
            Ok("PLAN_COMPLETE".into()),
        ]));
        let executor = Arc::new(RecordingExecutor::default());

        let phase = PlanningPhase::new(model.clone(), executor.clone(), &AppConfig::default());
        phase.plan("anything", &[]).await;

        assert!(executor.calls().is_empty());
        let second = &model.calls()[1];
        let results = &second.last().unwrap().content;
        assert!(results.contains("Tool: write_file\nError:"));
        assert!(results.contains("not allowed during planning"));
    }

    #[tokio::test]
    async fn failed_generation_yields_empty_plan() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let phase = PlanningPhase::new(
            model,
            Arc::new(RecordingExecutor::default()),
            &AppConfig::default(),
        );
        let (plan, outcome) = phase.plan("anything", &[]).await;
        assert!(plan.is_empty());
        assert!(!outcome.success);
    }
}
