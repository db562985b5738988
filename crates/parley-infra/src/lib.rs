//! Infrastructure layer for Parley.
//!
//! Contains implementations of the ports defined in `parley-core`:
//! SQLite storage for messages, threads and checkpoints, the
//! OpenAI-compatible completion provider, and the configuration loader.

pub mod config;
pub mod llm;
pub mod sqlite;
