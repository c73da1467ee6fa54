//! # Kestrel Core
//!
//! Domain types, ports, and error definitions for the Kestrel coding assistant.
//! This crate has **no framework dependencies**: it defines the model that the
//! orchestration engine and its collaborators implement against.
//!
//! ## Ports
//!
//! The engine never talks to a wire protocol or the filesystem directly.
//! It goes through two narrow traits defined here:
//! - [`ModelClient`] for streamed and one-shot generation
//! - [`ToolExecutor`] for running a named tool with JSON parameters

pub mod error;
pub mod message;
pub mod model;
pub mod tool;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{ModelError, ToolError};
pub use message::{Conversation, ConversationId, Message, Role};
pub use model::{GenerateOptions, ModelClient, TextStream};
pub use tool::{
    Tool, ToolCall, ToolCategory, ToolDefinition, ToolExecutionResult, ToolExecutor, ToolParams,
    ToolRegistry,
};
pub use event::{DomainEvent, EventBus};
