//! Context window management.
//!
//! - [`token`]: provider-calibrated token estimates
//! - [`budget`]: trim / summarize / emergency reset before each model call
//! - [`summarizer`]: model-backed compression used by the budget manager
//! - [`truncate`]: per-result character cap applied after tool execution

pub mod budget;
pub mod summarizer;
pub mod token;
pub mod truncate;

pub use budget::{ContextAction, ContextManager, ContextSnapshot};
pub use summarizer::Summarizer;
pub use token::TokenCounter;
pub use truncate::{ResultTruncator, DEFAULT_MAX_RESULT_CHARS};
