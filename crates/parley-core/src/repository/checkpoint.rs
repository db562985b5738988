//! CheckpointStore trait definition.
//!
//! Durable, thread-keyed snapshot of the orchestrator's working set. One
//! checkpoint per thread; every `put` replaces the previous one.

use parley_types::error::RepositoryError;
use parley_types::session::SessionState;

pub trait CheckpointStore: Send + Sync {
    fn get(
        &self,
        thread_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<SessionState>, RepositoryError>> + Send;

    /// Store `state` under `state.thread_id`, replacing any previous checkpoint.
    fn put(
        &self,
        state: &SessionState,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
