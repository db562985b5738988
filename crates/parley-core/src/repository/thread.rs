//! ThreadRegistry trait definition.

use parley_types::error::RepositoryError;
use parley_types::thread::Thread;

/// Per-thread metadata with upsert semantics.
///
/// Implementations live in parley-infra (e.g., `SqliteThreadRegistry`).
pub trait ThreadRegistry: Send + Sync {
    /// Insert the thread, or update `user_id`, `language` and `last_updated`
    /// of an existing one. `created_at` of an existing thread is preserved.
    fn upsert(
        &self,
        thread: &Thread,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get(
        &self,
        thread_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Thread>, RepositoryError>> + Send;

    /// Threads owned by a user, most recently updated first.
    fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Thread>, RepositoryError>> + Send;
}
