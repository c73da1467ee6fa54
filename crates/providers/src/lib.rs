//! Model client implementations for Kestrel.
//!
//! All clients implement `kestrel_core::ModelClient`. [`build_client`]
//! selects one from configuration.

pub mod anthropic;
pub mod factory;
pub mod openai_compat;
mod sse;

pub use anthropic::AnthropicClient;
pub use factory::build_client;
pub use openai_compat::OpenAiCompatClient;
