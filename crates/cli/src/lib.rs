//! Terminal front end for Kestrel.
//!
//! The binary in `main.rs` parses arguments and wires these pieces up:
//! - [`session`]: one conversation bound to a working directory
//! - [`prompt`]: the system prompt given to the model
//! - [`terminal`]: stdin/stderr implementations of the interactive ports

pub mod prompt;
pub mod session;
pub mod terminal;

pub use session::Session;
