//! MessageStore trait definition.
//!
//! Append-only persistence of chat turns keyed by thread.
//! Follows the RPITIT pattern used by every repository trait in this crate.

use parley_types::chat::{ChatMessage, MessageRole};
use parley_types::error::RepositoryError;
use uuid::Uuid;

/// Repository trait for chat message persistence.
///
/// Implementations live in parley-infra (e.g., `SqliteMessageStore`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait MessageStore: Send + Sync {
    /// Append a message to its thread and return the stored record.
    ///
    /// At most one message exists per (thread_id, turn_id, role). Appending a
    /// duplicate returns the existing record unchanged, so retries never
    /// create a second row. The returned message carries its assigned `seq`.
    fn append(
        &self,
        message: &ChatMessage,
    ) -> impl std::future::Future<Output = Result<ChatMessage, RepositoryError>> + Send;

    /// The newest `limit` messages of a thread, newest first.
    fn recent(
        &self,
        thread_id: &str,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// The message a turn produced for the given role, if it was persisted.
    fn find_by_turn(
        &self,
        thread_id: &str,
        turn_id: &Uuid,
        role: MessageRole,
    ) -> impl std::future::Future<Output = Result<Option<ChatMessage>, RepositoryError>> + Send;

    /// Total number of messages in a thread.
    fn count(
        &self,
        thread_id: &str,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
