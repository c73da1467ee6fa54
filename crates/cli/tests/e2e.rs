//! End-to-end tests: a scripted model drives the full turn pipeline
//! against the real local tools in a temporary directory.

use async_trait::async_trait;
use kestrel_agent::{AgentStreamEvent, CompletionReason, PlanApprover, PlanDecision};
use kestrel_cli::Session;
use kestrel_config::AppConfig;
use kestrel_core::error::ModelError;
use kestrel_core::event::DomainEvent;
use kestrel_core::message::{Message, Role};
use kestrel_core::model::{GenerateOptions, ModelClient, TextStream};
use kestrel_security::PermissionGate;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

// ── Scripted model ───────────────────────────────────────────────────────

struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn provider_name(&self) -> &str {
        "e2e"
    }

    fn model_name(&self) -> String {
        "e2e-model".into()
    }

    async fn generate_streaming(
        &self,
        messages: &[Message],
        _options: &GenerateOptions,
    ) -> Result<TextStream, ModelError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::StreamInterrupted("script exhausted".into()))?;
        let (tx, rx) = mpsc::channel(reply.split_inclusive('\n').count().max(1));
        for line in reply.split_inclusive('\n') {
            tx.send(Ok(line.to_string())).await.unwrap();
        }
        Ok(rx)
    }
}

struct AutoApprove;

#[async_trait]
impl PlanApprover for AutoApprove {
    async fn approve(&self, _plan: &str) -> PlanDecision {
        PlanDecision::Approve
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn call(tool: &str, params: serde_json::Value) -> String {
    format!(
        "```tool_call\n{}\n```\n",
        serde_json::json!({"tool": tool, "parameters": params})
    )
}

fn no_classification() -> AppConfig {
    let mut config = AppConfig::default();
    config.agent.enable_task_classification = false;
    config
}

fn canonical(dir: &Path) -> PathBuf {
    dir.canonicalize().unwrap()
}

fn trusted_gate(dir: &Path) -> PermissionGate {
    let gate = PermissionGate::new(canonical(dir));
    gate.grant_all_writes();
    gate.grant_all_bash();
    gate
}

fn tool_results(messages: &[Message]) -> Vec<&str> {
    messages
        .iter()
        .filter(|m| m.role == Role::User && m.content.starts_with("Tool execution results:"))
        .map(|m| m.content.as_str())
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn writes_reads_and_completes() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(&[
        &format!(
            "I'll create the file.\n{}",
            call("write_file", serde_json::json!({"file_path": "src/hello.txt", "content": "hello world\n"}))
        ),
        &call("read_file", serde_json::json!({"file_path": "src/hello.txt"})),
        "The file is in place. TASK_COMPLETE",
    ]);

    let mut session = Session::new(no_classification(), model.clone(), trusted_gate(dir.path()));
    let report = session.send("create src/hello.txt", None).await;

    assert!(report.outcome.success);
    assert_eq!(report.outcome.iteration_count, 3);
    assert_eq!(report.outcome.tool_call_count, 2);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("src/hello.txt")).unwrap(),
        "hello world\n"
    );

    let results = tool_results(session.messages());
    assert_eq!(results.len(), 2);
    assert!(results[0].contains("Tool: write_file\nResult: Successfully wrote 12 characters"));
    assert!(results[1].contains("hello world"));

    // System prompt first, with the working directory and tools
    let first = &model.requests()[0];
    assert_eq!(first[0].role, Role::System);
    assert!(first[0].content.contains(&canonical(dir.path()).display().to_string()));
    assert!(first[0].content.contains("### edit_file"));
}

#[tokio::test]
async fn denied_write_is_reported_to_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(&[
        &call("write_file", serde_json::json!({"file_path": "x.txt", "content": "x"})),
        "I could not write the file. TASK_COMPLETE",
    ]);

    // No prompt and no grants: every request is refused
    let gate = PermissionGate::new(canonical(dir.path()));
    let mut session = Session::new(no_classification(), model, gate);
    let report = session.send("write x.txt", None).await;

    assert!(report.outcome.success);
    assert!(!dir.path().join("x.txt").exists());
    let results = tool_results(session.messages());
    assert!(results[0].contains("Tool: write_file\nError: Permission denied"));
}

#[tokio::test]
async fn dangerous_command_needs_confirmation_despite_grants() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("build")).unwrap();
    let model = ScriptedModel::new(&[
        &call("run_bash", serde_json::json!({"command": "rm -rf build"})),
        "Cleanup was refused. TASK_COMPLETE",
    ]);

    let mut session = Session::new(no_classification(), model, trusted_gate(dir.path()));
    session.send("clean the build dir", None).await;

    assert!(dir.path().join("build").exists());
    let results = tool_results(session.messages());
    assert!(results[0].contains("Dangerous command declined (Recursive force delete)"));
}

#[tokio::test]
async fn parallel_reads_keep_call_order() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a", "b", "c"] {
        std::fs::write(dir.path().join(format!("{name}.txt")), format!("content {name}")).unwrap();
    }
    let batch: String = ["a", "b", "c"]
        .iter()
        .map(|n| call("read_file", serde_json::json!({"file_path": format!("{n}.txt")})))
        .collect();
    let model = ScriptedModel::new(&[&batch, "TASK_COMPLETE"]);

    let mut session = Session::new(no_classification(), model, trusted_gate(dir.path()));
    session.send("read all three", None).await;

    let results = tool_results(session.messages())[0];
    let a = results.find("content a").unwrap();
    let b = results.find("content b").unwrap();
    let c = results.find("content c").unwrap();
    assert!(a < b && b < c);
}

#[tokio::test]
async fn large_results_are_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let body = format!("HEAD{}TAIL", "m".repeat(50_000));
    std::fs::write(dir.path().join("big.log"), &body).unwrap();
    let model = ScriptedModel::new(&[
        &call("read_file", serde_json::json!({"file_path": "big.log"})),
        "TASK_COMPLETE",
    ]);

    let mut config = no_classification();
    config.context.model_max_context_override = Some(200_000);
    let mut session = Session::new(config, model, trusted_gate(dir.path()));
    session.send("read the log", None).await;

    let results = tool_results(session.messages())[0];
    assert!(results.contains("characters from read_file output]"));
    assert!(results.contains("TAIL"));
    assert!(results.chars().count() < 10_200);
}

#[tokio::test]
async fn complex_task_plans_then_executes() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(&[
        r#"{"complexity": "COMPLEX", "reasoning": "new module", "estimated_tool_calls": 8}"#,
        // Planning: a write is refused, then the plan
        &call("write_file", serde_json::json!({"file_path": "early.txt", "content": "no"})),
        "## Implementation Plan\n1. create notes.md\nPLAN_COMPLETE",
        // Execution
        &call("write_file", serde_json::json!({"file_path": "notes.md", "content": "# Notes\n"})),
        "Created notes.md. TASK_COMPLETE",
    ]);

    let mut session = Session::new(AppConfig::default(), model, trusted_gate(dir.path()))
        .with_approver(Arc::new(AutoApprove));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let report = session.send("set up project notes", Some(tx)).await;

    assert!(report.plan.as_deref().unwrap().contains("Implementation Plan"));
    assert!(report.outcome.success);
    assert!(!dir.path().join("early.txt").exists());
    assert!(dir.path().join("notes.md").exists());
    assert!(session
        .messages()
        .iter()
        .any(|m| m.content.starts_with("Approved plan:")));

    let mut failed_tools = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let AgentStreamEvent::ToolResult { name, success: false, .. } = event {
            failed_tools.push(name);
        }
    }
    assert_eq!(failed_tools, vec!["write_file".to_string()]);
}

#[tokio::test]
async fn generation_failure_ends_the_turn() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(&[]);
    let mut session = Session::new(no_classification(), model, trusted_gate(dir.path()));
    let mut events = session.event_bus().subscribe();

    let report = session.send("anything", None).await;
    assert!(!report.outcome.success);
    assert_eq!(report.outcome.completion_reason, CompletionReason::GenerationFailed);
    assert!(report.outcome.error.unwrap().contains("script exhausted"));

    let mut failed = false;
    while let Ok(event) = events.try_recv() {
        failed |= matches!(*event, DomainEvent::GenerationFailed { .. });
    }
    assert!(failed);
}

#[tokio::test]
async fn clear_keeps_only_the_system_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(&["Hello! TASK_COMPLETE"]);
    let mut session = Session::new(no_classification(), model, trusted_gate(dir.path()));

    session.send("hi", None).await;
    assert_eq!(session.messages().len(), 3);
    session.clear();
    assert_eq!(session.messages().len(), 1);
    assert!(session.messages()[0].is_system());
}
