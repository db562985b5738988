//! Chat message and turn request/response types for Parley.
//!
//! A thread's history is an append-only sequence of `ChatMessage`s. Every
//! message belongs to a turn: the inbound user message and the assistant
//! reply it produced share the same `turn_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Re-export MessageRole from llm module (it's used in both chat and llm contexts).
pub use crate::llm::MessageRole;
use crate::llm::Message;

/// A single message within a thread.
///
/// Messages are ordered by `created_at`, ties broken by `seq`.
/// Assistant messages include token usage and response timing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub thread_id: String,
    /// Turn that produced this message.
    pub turn_id: Uuid,
    /// Store-assigned insertion sequence. `None` until the message is persisted.
    #[serde(default)]
    pub seq: Option<i64>,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Input tokens consumed by this message (assistant messages only).
    #[serde(default)]
    pub input_tokens: Option<u32>,
    /// Output tokens generated for this message (assistant messages only).
    #[serde(default)]
    pub output_tokens: Option<u32>,
    /// Model used for this message (assistant messages only).
    #[serde(default)]
    pub model: Option<String>,
    /// Why the LLM stopped generating (assistant messages only).
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Response latency in milliseconds (assistant messages only).
    #[serde(default)]
    pub response_ms: Option<u64>,
}

impl ChatMessage {
    /// A not-yet-persisted message without generation metadata.
    pub fn new(
        thread_id: impl Into<String>,
        turn_id: Uuid,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            thread_id: thread_id.into(),
            turn_id,
            seq: None,
            role,
            content: content.into(),
            created_at: Utc::now(),
            input_tokens: None,
            output_tokens: None,
            model: None,
            stop_reason: None,
            response_ms: None,
        }
    }

    pub fn user(thread_id: impl Into<String>, turn_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(thread_id, turn_id, MessageRole::User, content)
    }

    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }

    pub fn is_system(&self) -> bool {
        self.role == MessageRole::System
    }

    /// Provider wire shape (role and content only).
    pub fn to_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Inbound turn request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub user_id: String,
    pub thread_id: String,
    pub text: String,
    /// Client idempotency key. Resending a request with the same `turn_id`
    /// never produces a second reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// A message as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&ChatMessage> for MessageView {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            timestamp: message.created_at,
        }
    }
}

/// Result of a completed turn: recent history (oldest first) plus the
/// thread's language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    pub messages: Vec<MessageView>,
    pub language: String,
    pub turn_id: Uuid,
    /// True when the reply was served from the checkpoint instead of a new
    /// completion call.
    #[serde(default)]
    pub replayed: bool,
}
