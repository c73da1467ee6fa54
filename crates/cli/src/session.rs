//! A chat session: conversation state plus everything needed to run turns.

use kestrel_agent::{AgentStreamEvent, PlanApprover, TurnReport, TurnRunner};
use kestrel_config::AppConfig;
use kestrel_core::event::EventBus;
use kestrel_core::message::{Conversation, ConversationId, Message};
use kestrel_core::model::ModelClient;
use kestrel_core::tool::{ToolDefinition, ToolExecutor};
use kestrel_security::{PermissionGate, SafetyLimits};
use kestrel_tools::{default_registry, ToolContext};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::prompt::system_prompt;

pub struct Session {
    config: AppConfig,
    client: Arc<dyn ModelClient>,
    executor: Arc<dyn ToolExecutor>,
    definitions: Vec<ToolDefinition>,
    working_dir: PathBuf,
    approver: Option<Arc<dyn PlanApprover>>,
    event_bus: Arc<EventBus>,
    conversation: Conversation,
}

impl Session {
    /// Build the local tools around `gate` and start a fresh conversation.
    pub fn new(config: AppConfig, client: Arc<dyn ModelClient>, gate: PermissionGate) -> Self {
        let working_dir = gate.working_dir().to_path_buf();
        let limits = SafetyLimits::from_config(&config.agent, &config.safety);
        let registry = default_registry(Arc::new(ToolContext::new(Arc::new(gate), limits)));
        let definitions = registry.definitions();

        let mut session = Self {
            config,
            client,
            executor: Arc::new(registry),
            definitions,
            working_dir,
            approver: None,
            event_bus: Arc::new(EventBus::default()),
            conversation: Conversation::new(String::new()),
        };
        session.clear();
        session
    }

    pub fn with_approver(mut self, approver: Arc<dyn PlanApprover>) -> Self {
        self.approver = Some(approver);
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn client(&self) -> &Arc<dyn ModelClient> {
        &self.client
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.conversation.messages
    }

    /// Start a new conversation holding only the system prompt.
    pub fn clear(&mut self) {
        self.conversation = Conversation::new(system_prompt(&self.working_dir, &self.definitions));
    }

    /// Run one user turn. Progress goes to `stream` when given.
    pub async fn send(
        &mut self,
        text: &str,
        stream: Option<mpsc::UnboundedSender<AgentStreamEvent>>,
    ) -> TurnReport {
        let mut runner = TurnRunner::new(
            Arc::clone(&self.client),
            Arc::clone(&self.executor),
            self.config.clone(),
        )
        .with_event_bus(Arc::clone(&self.event_bus));
        if let Some(approver) = &self.approver {
            runner = runner.with_approver(Arc::clone(approver));
        }
        if let Some(tx) = stream {
            runner = runner.with_stream(tx);
        }
        let report = runner.run(&mut self.conversation.messages, text).await;
        self.conversation.updated_at = chrono::Utc::now();
        report
    }
}
