//! One user turn, end to end: classify, pick a strategy, optionally plan,
//! then run the agent loop.

use kestrel_config::AppConfig;
use kestrel_core::event::EventBus;
use kestrel_core::message::Message;
use kestrel_core::model::ModelClient;
use kestrel_core::tool::ToolExecutor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::classifier::{Complexity, TaskClassification, TaskClassifier};
use crate::completion::CompletionReason;
use crate::loop_runner::{AgentLoop, ExecutionOutcome};
use crate::planning::{PlanApprover, PlanDecision, PlanningPhase};
use crate::stream_event::AgentStreamEvent;
use crate::strategy::ExecutionStrategy;

/// Everything decided and produced during one turn.
#[derive(Debug, Clone)]
pub struct TurnReport {
    /// `None` when classification is disabled
    pub classification: Option<TaskClassification>,
    pub strategy: ExecutionStrategy,
    pub plan: Option<String>,
    pub outcome: ExecutionOutcome,
}

pub struct TurnRunner {
    client: Arc<dyn ModelClient>,
    executor: Arc<dyn ToolExecutor>,
    config: AppConfig,
    approver: Option<Arc<dyn PlanApprover>>,
    event_bus: Arc<EventBus>,
    stream: Option<mpsc::UnboundedSender<AgentStreamEvent>>,
}

impl TurnRunner {
    pub fn new(
        client: Arc<dyn ModelClient>,
        executor: Arc<dyn ToolExecutor>,
        config: AppConfig,
    ) -> Self {
        Self {
            client,
            executor,
            config,
            approver: None,
            event_bus: Arc::new(EventBus::default()),
            stream: None,
        }
    }

    /// Planning only happens when an approver is present.
    pub fn with_approver(mut self, approver: Arc<dyn PlanApprover>) -> Self {
        self.approver = Some(approver);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_stream(mut self, tx: mpsc::UnboundedSender<AgentStreamEvent>) -> Self {
        self.stream = Some(tx);
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Append `user_message` to `messages` and work on it.
    pub async fn run(&self, messages: &mut Vec<Message>, user_message: &str) -> TurnReport {
        messages.push(Message::user(user_message));
        let ceiling = self.config.agent.max_iterations;

        let (classification, strategy) = if self.config.agent.enable_task_classification {
            let classification = TaskClassifier::new(Arc::clone(&self.client))
                .classify(user_message)
                .await;
            let strategy = ExecutionStrategy::for_complexity(classification.complexity, ceiling);
            self.switch_model(&strategy);
            (Some(classification), strategy)
        } else {
            (None, ExecutionStrategy::for_complexity(Complexity::Simple, ceiling))
        };
        info!(
            complexity = %strategy.complexity,
            max_iterations = strategy.max_iterations,
            model = %self.client.model_name(),
            "Execution strategy selected"
        );

        let mut plan = None;
        if strategy.use_planning
            && strategy.complexity == Complexity::Complex
            && self.config.agent.enable_planning_phase
            && let Some(approver) = &self.approver
        {
            let mut phase =
                PlanningPhase::new(Arc::clone(&self.client), Arc::clone(&self.executor), &self.config)
                    .with_options(strategy.generate_options());
            if let Some(tx) = &self.stream {
                phase = phase.with_stream(tx.clone());
            }
            let (text, _) = phase.plan(user_message, messages).await;

            match approver.approve(&text).await {
                PlanDecision::Approve => {
                    messages.push(approved_plan(&text));
                }
                PlanDecision::Modify(changes) => {
                    messages.push(approved_plan(&text));
                    messages.push(Message::user(format!("Plan modifications: {changes}")));
                }
                PlanDecision::Reject => {
                    warn!("Plan rejected, cancelling task");
                    return TurnReport {
                        classification,
                        strategy,
                        plan: Some(text),
                        outcome: ExecutionOutcome {
                            success: true,
                            completion_reason: CompletionReason::PlanRejected,
                            iteration_count: 0,
                            tool_call_count: 0,
                            error: None,
                        },
                    };
                }
            }
            plan = Some(text);
        }

        let mut agent = AgentLoop::new(
            Arc::clone(&self.client),
            Arc::clone(&self.executor),
            &self.config,
        )
        .with_max_iterations(strategy.max_iterations)
        .with_options(strategy.generate_options())
        .with_event_bus(Arc::clone(&self.event_bus));
        if let Some(tx) = &self.stream {
            agent = agent.with_stream(tx.clone());
        }
        let outcome = agent.run(messages).await;

        TurnReport {
            classification,
            strategy,
            plan,
            outcome,
        }
    }

    fn switch_model(&self, strategy: &ExecutionStrategy) {
        let Some(target) = strategy.model_tier.model_for(self.client.provider_name()) else {
            return;
        };
        let current = self.client.model_name();
        if current != target {
            debug!(from = %current, to = target, "Switching model for this turn");
            self.client.set_model(target);
        }
    }
}

fn approved_plan(plan: &str) -> Message {
    Message::user(format!(
        "Approved plan:\n\n{plan}\n\nProceed with the implementation."
    ))
}
