//! Thread metadata types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-thread metadata kept by the thread registry.
///
/// Created on the first message of a thread and touched on every turn.
/// The core never deletes threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub thread_id: String,
    pub user_id: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Thread {
    pub fn new(
        thread_id: impl Into<String>,
        user_id: impl Into<String>,
        language: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            language: language.into(),
            created_at: at,
            last_updated: at,
        }
    }
}
