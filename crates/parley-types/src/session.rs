//! Checkpointed conversation state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::ChatMessage;

/// Durable snapshot of one thread's working set, written once per turn
/// after a reply has been generated.
///
/// `messages` is always a suffix of the persisted history plus the reply of
/// `last_turn`. It is never fabricated or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub thread_id: String,
    pub messages: Vec<ChatMessage>,
    pub language: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub last_turn: Option<TurnReceipt>,
}

impl SessionState {
    /// Whether this checkpoint already records the given turn.
    pub fn records_turn(&self, turn_id: Uuid, user_message_id: Uuid) -> bool {
        self.last_turn
            .as_ref()
            .is_some_and(|r| r.turn_id == turn_id && r.user_message_id == user_message_id)
    }
}

/// Record of the most recent completed turn on a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnReceipt {
    pub turn_id: Uuid,
    pub user_message_id: Uuid,
    pub reply: ChatMessage,
}
