//! LLM provider abstractions for Parley.
//!
//! - `LlmProvider`: RPITIT trait for concrete provider implementations
//! - `CompletionBackend`: the completion step of a turn (prompt -> reply)
//! - `TokenCounter`: per-message token counting for the window builder

pub mod backend;
pub mod provider;
pub mod token;
