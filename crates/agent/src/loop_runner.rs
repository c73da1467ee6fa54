//! The agent reasoning loop implementation.
//!
//! Each iteration:
//!
//! 1. **Budget**: shrink the conversation if it is near the window
//! 2. **Generate**: stream the model's reply to completion
//! 3. **Parse**: pull tool calls out of the reply
//! 4. **Decide**: stop if the completion detector says so
//! 5. **Act**: run the (capped) tool batch and feed the results back

use kestrel_config::AppConfig;
use kestrel_core::error::ModelError;
use kestrel_core::event::{DomainEvent, EventBus};
use kestrel_core::message::Message;
use kestrel_core::model::{GenerateOptions, ModelClient};
use kestrel_core::tool::{ToolCall, ToolExecutionResult, ToolExecutor};
use kestrel_security::SafetyLimits;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::completion::{CompletionDetector, CompletionReason};
use crate::context::{ContextAction, ContextManager, ResultTruncator, Summarizer};
use crate::parser::{parse_tool_calls, ToolCallParser};
use crate::scheduler::ToolScheduler;
use crate::stream_event::AgentStreamEvent;

/// Terminal record of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub completion_reason: CompletionReason,
    pub iteration_count: usize,
    pub tool_call_count: usize,
    pub error: Option<String>,
}

/// The core agent loop that orchestrates model calls and tool execution.
pub struct AgentLoop {
    client: Arc<dyn ModelClient>,
    scheduler: ToolScheduler,
    context: ContextManager,
    detector: CompletionDetector,
    truncator: ResultTruncator,
    parser: ToolCallParser,
    options: GenerateOptions,
    event_bus: Arc<EventBus>,
    stream: Option<mpsc::UnboundedSender<AgentStreamEvent>>,

    /// Iteration ceiling, per-turn tool budget and the advisory run timeout
    limits: SafetyLimits,
    /// Tool-less turns after this many iterations may be declared stuck
    stuck_loop_floor: usize,
    stuck_loop_min_chars: usize,
}

impl AgentLoop {
    /// Create a loop wired from configuration. The context budget follows
    /// the client's current provider and model.
    pub fn new(
        client: Arc<dyn ModelClient>,
        executor: Arc<dyn ToolExecutor>,
        config: &AppConfig,
    ) -> Self {
        let context = ContextManager::new(
            &config.context,
            client.provider_name(),
            &client.model_name(),
        )
        .with_summarizer(Summarizer::new(Arc::clone(&client)));

        Self {
            scheduler: ToolScheduler::new(executor, &config.parallel),
            context,
            detector: CompletionDetector::new()
                .with_long_response_threshold(config.agent.long_response_threshold),
            truncator: ResultTruncator::new(config.context.max_tool_result_chars),
            parser: parse_tool_calls,
            options: GenerateOptions::default(),
            event_bus: Arc::new(EventBus::default()),
            stream: None,
            limits: SafetyLimits::from_config(&config.agent, &config.safety),
            stuck_loop_floor: config.agent.stuck_loop_floor,
            stuck_loop_min_chars: config.agent.stuck_loop_min_chars,
            client,
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.limits.max_iterations = max;
        self
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the default fenced-JSON tool-call parser.
    pub fn with_parser(mut self, parser: ToolCallParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Forward live progress to a front end.
    pub fn with_stream(mut self, tx: mpsc::UnboundedSender<AgentStreamEvent>) -> Self {
        self.stream = Some(tx);
        self
    }

    pub fn with_context_manager(mut self, context: ContextManager) -> Self {
        self.context = context;
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.limits.max_iterations
    }

    fn emit(&self, event: AgentStreamEvent) {
        if let Some(tx) = &self.stream {
            // A closed receiver just means nobody is watching
            let _ = tx.send(event);
        }
    }

    /// Drive `messages` until the task completes, generation fails or the
    /// iteration budget runs out. The loop is the only writer of `messages`
    /// for the duration of the call.
    pub async fn run(&self, messages: &mut Vec<Message>) -> ExecutionOutcome {
        let mut tool_call_count = 0;
        let mut iteration = 0;
        let started = Instant::now();
        let mut overran = false;

        info!(
            messages = messages.len(),
            max_iterations = self.limits.max_iterations,
            model = %self.client.model_name(),
            "Starting agent loop"
        );

        while self.limits.check_iteration_limit(iteration) {
            iteration += 1;
            debug!(iteration, max = self.limits.max_iterations, "Agent loop iteration");
            self.event_bus.publish(DomainEvent::IterationStarted {
                iteration,
                max_iterations: self.limits.max_iterations,
                timestamp: Utc::now(),
            });

            // Advisory only: the run keeps going
            if !overran && self.limits.total_timeout_exceeded(started.elapsed()) {
                overran = true;
                warn!(
                    iteration,
                    elapsed_secs = started.elapsed().as_secs(),
                    limit_secs = self.limits.total_timeout.as_secs(),
                    "Run exceeded its total time budget"
                );
            }

            // ── Budget ──
            let snapshot = self.context.check_and_manage(messages).await;
            if snapshot.action != ContextAction::None {
                self.event_bus.publish(DomainEvent::ContextManaged {
                    action: snapshot.action.to_string(),
                    tokens_before: snapshot.tokens_before,
                    tokens_after: snapshot.tokens_after,
                    timestamp: Utc::now(),
                });
            }

            // ── Generate ──
            let response = match self.generate(messages).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(iteration, error = %e, "Model generation failed");
                    self.event_bus.publish(DomainEvent::GenerationFailed {
                        error_message: e.to_string(),
                        iteration,
                        timestamp: Utc::now(),
                    });
                    return ExecutionOutcome {
                        success: false,
                        completion_reason: CompletionReason::GenerationFailed,
                        iteration_count: iteration,
                        tool_call_count,
                        error: Some(e.to_string()),
                    };
                }
            };
            messages.push(Message::assistant(&response));

            // ── Parse + decide ──
            let mut calls = (self.parser)(&response);
            let check =
                self.detector
                    .classify(&response, !calls.is_empty(), iteration, self.limits.max_iterations);
            if check.done {
                return self.finish(check.reason, iteration, tool_call_count);
            }

            if calls.is_empty() {
                if iteration > self.stuck_loop_floor
                    && response.chars().count() >= self.stuck_loop_min_chars
                {
                    warn!(iteration, "No tool calls and no completion signal, stopping");
                    return self.finish(CompletionReason::StuckLoop, iteration, tool_call_count);
                }
                debug!(iteration, "No tool calls and not complete, continuing");
                continue;
            }

            // ── Act ──
            if !self.limits.check_tool_limit(calls.len()) {
                let limit = self.limits.max_tools_per_turn;
                self.emit(AgentStreamEvent::Dropped {
                    count: calls.len() - limit,
                });
                calls.truncate(limit);
            }

            let results = self.execute_tools(&calls).await;
            tool_call_count += calls.len();
            messages.push(Message::user(format!(
                "Tool execution results:\n\n{}",
                format_results(&calls, &results)
            )));
        }

        self.finish(CompletionReason::MaxIterations, iteration, tool_call_count)
    }

    /// Stream one reply and join the chunks.
    async fn generate(&self, messages: &[Message]) -> Result<String, ModelError> {
        let mut rx = self.client.generate_streaming(messages, &self.options).await?;
        let mut text = String::new();
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            self.emit(AgentStreamEvent::Chunk {
                content: chunk.clone(),
            });
            text.push_str(&chunk);
        }
        Ok(text)
    }

    /// Run one capped batch through the scheduler and truncate each payload.
    async fn execute_tools(&self, calls: &[ToolCall]) -> Vec<ToolExecutionResult> {
        for call in calls {
            self.emit(AgentStreamEvent::ToolCall {
                name: call.name.clone(),
                parameters: serde_json::Value::Object(call.parameters.clone()),
            });
        }

        let start = Instant::now();
        let results: Vec<ToolExecutionResult> = self
            .scheduler
            .execute(calls)
            .await
            .into_iter()
            .zip(calls)
            .map(|(result, call)| ToolExecutionResult {
                success: result.success,
                output: self.truncator.truncate(&result.output, &call.name),
            })
            .collect();
        let duration_ms = start.elapsed().as_millis() as u64;

        let failures = results.iter().filter(|r| !r.success).count();
        for (call, result) in calls.iter().zip(&results) {
            if !result.success {
                warn!(tool = %call.name, error = %result.output, "Tool call failed");
            }
            self.emit(AgentStreamEvent::ToolResult {
                name: call.name.clone(),
                output: result.output.clone(),
                success: result.success,
            });
        }
        self.event_bus.publish(DomainEvent::ToolsExecuted {
            tool_names: calls.iter().map(|c| c.name.clone()).collect(),
            failures,
            duration_ms,
            timestamp: Utc::now(),
        });
        results
    }

    fn finish(
        &self,
        reason: CompletionReason,
        iteration_count: usize,
        tool_call_count: usize,
    ) -> ExecutionOutcome {
        info!(reason = %reason, iterations = iteration_count, tool_calls = tool_call_count, "Task complete");
        self.event_bus.publish(DomainEvent::TaskCompleted {
            reason: reason.to_string(),
            iterations: iteration_count,
            tool_calls: tool_call_count,
            timestamp: Utc::now(),
        });
        ExecutionOutcome {
            success: true,
            completion_reason: reason,
            iteration_count,
            tool_call_count,
            error: None,
        }
    }
}

/// `Tool: name\nResult: ...` (or `Error: ...`) blocks, one per call.
fn format_results(calls: &[ToolCall], results: &[ToolExecutionResult]) -> String {
    calls
        .iter()
        .zip(results)
        .map(|(call, result)| {
            let label = if result.success { "Result" } else { "Error" };
            format!("Tool: {}\n{label}: {}", call.name, result.output)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingExecutor, ScriptedModel};

    fn fenced(tool: &str, params: &str) -> String {
        format!("```tool_call\n{{\"tool\": \"{tool}\", \"parameters\": {params}}}\n```\n")
    }

    fn agent(model: Arc<ScriptedModel>, executor: Arc<RecordingExecutor>) -> AgentLoop {
        AgentLoop::new(model, executor, &AppConfig::default())
    }

    fn conversation() -> Vec<Message> {
        vec![Message::system("You are a coding assistant."), Message::user("Fix the bug")]
    }

    #[tokio::test]
    async fn completes_on_marker() {
        let model = Arc::new(ScriptedModel::new(vec![Ok("Nothing to do. TASK_COMPLETE".into())]));
        let executor = Arc::new(RecordingExecutor::default());
        let mut msgs = conversation();

        let outcome = agent(model, executor.clone()).run(&mut msgs).await;
        assert!(outcome.success);
        assert_eq!(outcome.completion_reason.to_string(), "explicit_marker:TASK_COMPLETE");
        assert_eq!(outcome.iteration_count, 1);
        assert_eq!(outcome.tool_call_count, 0);
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[2], Message::assistant("Nothing to do. TASK_COMPLETE"));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn tool_results_feed_the_next_turn() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(format!(
                "Reading both.\n{}{}",
                fenced("read_file", r#"{"file_path": "a.rs"}"#),
                fenced("fail", "{}")
            )),
            Ok("Fixed it. TASK_COMPLETE".into()),
        ]));
        let executor = Arc::new(RecordingExecutor::default());
        let mut msgs = conversation();

        let outcome = agent(model.clone(), executor.clone()).run(&mut msgs).await;
        assert!(outcome.success);
        assert_eq!(outcome.iteration_count, 2);
        assert_eq!(outcome.tool_call_count, 2);

        assert_eq!(msgs[3].role, kestrel_core::Role::User);
        assert_eq!(
            msgs[3].content,
            "Tool execution results:\n\nTool: read_file\nResult: ran read_file\n\nTool: fail\nError: fail failed"
        );

        // The second request saw the tool results
        let calls = model.calls();
        assert_eq!(calls[1].last().unwrap().content, msgs[3].content);
    }

    #[tokio::test]
    async fn generation_error_is_fatal() {
        let model = Arc::new(ScriptedModel::new(vec![Err(ModelError::RateLimited {
            retry_after_secs: 5,
        })]));
        let bus = Arc::new(EventBus::default());
        let mut events = bus.subscribe();
        let mut msgs = conversation();

        let outcome = agent(model, Arc::new(RecordingExecutor::default()))
            .with_event_bus(bus)
            .run(&mut msgs)
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.completion_reason, CompletionReason::GenerationFailed);
        assert!(outcome.error.unwrap().contains("Rate limited"));
        assert_eq!(msgs.len(), 2);

        let mut saw_failure = false;
        while let Ok(event) = events.try_recv() {
            if matches!(*event, DomainEvent::GenerationFailed { iteration: 1, .. }) {
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn batch_capped_per_turn() {
        let many: String = (0..7)
            .map(|i| fenced("read_file", &format!(r#"{{"file_path": "{i}.rs"}}"#)))
            .collect();
        let model = Arc::new(ScriptedModel::new(vec![Ok(many), Ok("[DONE]".into())]));
        let executor = Arc::new(RecordingExecutor::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut msgs = conversation();

        let outcome = agent(model, executor.clone())
            .with_stream(tx)
            .run(&mut msgs)
            .await;
        assert_eq!(outcome.tool_call_count, 5);
        assert_eq!(executor.calls().len(), 5);

        let mut dropped = None;
        while let Ok(event) = rx.try_recv() {
            if let AgentStreamEvent::Dropped { count } = event {
                dropped = Some(count);
            }
        }
        assert_eq!(dropped, Some(2));
    }

    #[tokio::test]
    async fn stuck_loop_detected() {
        let rambling = "I'm currently analyzing the code structure. ".repeat(5);
        let model = Arc::new(ScriptedModel::new(vec![Ok(rambling); 6]));
        let mut msgs = conversation();

        let outcome = agent(model, Arc::new(RecordingExecutor::default()))
            .run(&mut msgs)
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.completion_reason, CompletionReason::StuckLoop);
        assert_eq!(outcome.iteration_count, 4);
    }

    #[tokio::test]
    async fn short_replies_never_count_as_stuck() {
        let model = Arc::new(ScriptedModel::new(vec![Ok("Hmm.".into()); 3]));
        let mut msgs = conversation();

        let outcome = agent(model, Arc::new(RecordingExecutor::default()))
            .with_max_iterations(3)
            .run(&mut msgs)
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.completion_reason, CompletionReason::MaxIterationsReached);
        assert_eq!(outcome.iteration_count, 3);
    }

    #[tokio::test]
    async fn iteration_ceiling_stops_before_tools() {
        let call = fenced("write_file", r#"{"file_path": "x", "content": "y"}"#);
        let model = Arc::new(ScriptedModel::new(vec![Ok(call); 2]));
        let executor = Arc::new(RecordingExecutor::default());
        let mut msgs = conversation();

        let outcome = agent(model, executor.clone())
            .with_max_iterations(2)
            .run(&mut msgs)
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.completion_reason.to_string(), "max_iterations_reached");
        assert_eq!(outcome.tool_call_count, 1);
        assert_eq!(executor.calls().len(), 1);
    }

    #[tokio::test]
    async fn zero_budget_reports_max_iterations() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let mut msgs = conversation();
        let outcome = agent(model, Arc::new(RecordingExecutor::default()))
            .with_max_iterations(0)
            .run(&mut msgs)
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.completion_reason.to_string(), "max_iterations");
        assert_eq!(outcome.iteration_count, 0);
    }

    #[tokio::test]
    async fn tool_budget_comes_from_config() {
        let three: String = (0..3)
            .map(|i| fenced("read_file", &format!(r#"{{"file_path": "{i}.rs"}}"#)))
            .collect();
        let model = Arc::new(ScriptedModel::new(vec![Ok(three), Ok("[DONE]".into())]));
        let executor = Arc::new(RecordingExecutor::default());
        let mut config = AppConfig::default();
        config.agent.max_tools_per_turn = 2;
        config.agent.max_iterations = 4;

        let agent = AgentLoop::new(model, executor.clone(), &config);
        assert_eq!(agent.max_iterations(), 4);
        let outcome = agent.run(&mut conversation()).await;
        assert_eq!(outcome.tool_call_count, 2);
        assert_eq!(executor.calls(), vec!["read_file".to_string(); 2]);
    }

    #[tokio::test]
    async fn total_timeout_is_advisory() {
        let call = fenced("read_file", r#"{"file_path": "a.rs"}"#);
        let model = Arc::new(ScriptedModel::new(vec![Ok(call), Ok("TASK_COMPLETE".into())]));
        let mut config = AppConfig::default();
        config.agent.total_timeout_secs = 0;

        let outcome = AgentLoop::new(model, Arc::new(RecordingExecutor::default()), &config)
            .run(&mut conversation())
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.iteration_count, 2);
        assert_eq!(outcome.tool_call_count, 1);
    }

    #[tokio::test]
    async fn oversized_results_are_truncated() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(fenced("run_bash", r#"{"command": "big"}"#)),
            Ok("TASK_COMPLETE".into()),
        ]));
        let executor = Arc::new(RecordingExecutor::with_output("z".repeat(30_000)));
        let mut config = AppConfig::default();
        config.context.max_tool_result_chars = 1_000;
        config.context.default_context_window = 200_000;
        config.context.model_max_context_override = Some(200_000);
        let mut msgs = conversation();

        AgentLoop::new(model, executor, &config).run(&mut msgs).await;
        let results = &msgs[3].content;
        assert!(results.contains("[truncated 29000 characters from run_bash output]"));
        assert!(results.len() < 1_200);
    }

    #[tokio::test]
    async fn publishes_lifecycle_events() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(fenced("list_files", r#"{"pattern": "*"}"#)),
            Ok("All set, TASK_COMPLETE".into()),
        ]));
        let bus = Arc::new(EventBus::default());
        let mut events = bus.subscribe();
        let mut msgs = conversation();

        agent(model, Arc::new(RecordingExecutor::default()))
            .with_event_bus(bus)
            .run(&mut msgs)
            .await;

        let mut started = 0;
        let mut executed = Vec::new();
        let mut completed = None;
        while let Ok(event) = events.try_recv() {
            match &*event {
                DomainEvent::IterationStarted { .. } => started += 1,
                DomainEvent::ToolsExecuted { tool_names, .. } => executed.extend(tool_names.clone()),
                DomainEvent::TaskCompleted { reason, .. } => completed = Some(reason.clone()),
                _ => {}
            }
        }
        assert_eq!(started, 2);
        assert_eq!(executed, vec!["list_files".to_string()]);
        assert_eq!(completed.as_deref(), Some("explicit_marker:TASK_COMPLETE"));
    }

    #[tokio::test]
    async fn streams_chunks_to_front_end() {
        let model = Arc::new(ScriptedModel::new(vec![Ok("Hello there. TASK_COMPLETE".into())]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut msgs = conversation();

        agent(model, Arc::new(RecordingExecutor::default()))
            .with_stream(tx)
            .run(&mut msgs)
            .await;

        let mut text = String::new();
        while let Ok(event) = rx.try_recv() {
            if let AgentStreamEvent::Chunk { content } = event {
                text.push_str(&content);
            }
        }
        assert_eq!(text, "Hello there. TASK_COMPLETE");
    }

    #[test]
    fn result_formatting() {
        let calls = vec![
            ToolCall::new("read_file", Default::default()),
            ToolCall::new("run_bash", Default::default()),
        ];
        let results = vec![ToolExecutionResult::ok("abc"), ToolExecutionResult::err("denied")];
        assert_eq!(
            format_results(&calls, &results),
            "Tool: read_file\nResult: abc\n\nTool: run_bash\nError: denied"
        );
    }
}
