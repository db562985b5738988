//! Shared domain types for Parley.
//!
//! This crate contains the types passed between the conversation core and its
//! adapters: chat messages, threads, checkpointed session state, LLM request
//! shapes, configuration, and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod session;
pub mod thread;
