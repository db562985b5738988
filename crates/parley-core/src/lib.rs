//! Conversation logic and repository trait definitions for Parley.
//!
//! This crate defines the "ports" (repository and completion traits) that the
//! infrastructure layer implements, the context window builder, and the turn
//! state machine. It depends only on `parley-types` -- never on
//! `parley-infra` or any database/IO crate.

pub mod chat;
pub mod context;
pub mod llm;
pub mod repository;
pub mod turn;

#[cfg(test)]
pub(crate) mod testing;
