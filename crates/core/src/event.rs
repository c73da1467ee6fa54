//! Domain event system: lets front ends observe a run without coupling to
//! the agent loop.
//!
//! The loop publishes events as it moves through iterations; a CLI spinner,
//! a log sink or a test can subscribe and filter for what it cares about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A new iteration began
    IterationStarted {
        iteration: usize,
        max_iterations: usize,
        timestamp: DateTime<Utc>,
    },

    /// The context budget manager changed the conversation
    ContextManaged {
        action: String,
        tokens_before: usize,
        tokens_after: usize,
        timestamp: DateTime<Utc>,
    },

    /// A batch of tool calls finished
    ToolsExecuted {
        tool_names: Vec<String>,
        failures: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The run finished normally
    TaskCompleted {
        reason: String,
        iterations: usize,
        tool_calls: usize,
        timestamp: DateTime<Utc>,
    },

    /// Model generation failed and the run was aborted
    GenerationFailed {
        error_message: String,
        iteration: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
