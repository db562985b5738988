//! SQLite checkpoint store implementation.
//!
//! Each thread has at most one row holding its `SessionState` as JSON.

use chrono::Utc;
use parley_core::repository::checkpoint::CheckpointStore;
use parley_types::error::RepositoryError;
use parley_types::session::SessionState;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, map_sqlx_error};

/// SQLite-backed implementation of `CheckpointStore`.
pub struct SqliteCheckpointStore {
    pool: DatabasePool,
}

impl SqliteCheckpointStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    async fn get(&self, thread_id: &str) -> Result<Option<SessionState>, RepositoryError> {
        let row = sqlx::query("SELECT state FROM session_checkpoints WHERE thread_id = ?1")
            .bind(thread_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let state: String = row
            .try_get("state")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        serde_json::from_str(&state)
            .map(Some)
            .map_err(|e| RepositoryError::Query(format!("invalid checkpoint: {e}")))
    }

    async fn put(&self, state: &SessionState) -> Result<(), RepositoryError> {
        let json = serde_json::to_string(state)
            .map_err(|e| RepositoryError::Query(format!("checkpoint serialization failed: {e}")))?;

        sqlx::query(
            r#"INSERT INTO session_checkpoints (thread_id, state, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(thread_id) DO UPDATE SET
                state = excluded.state,
                updated_at = excluded.updated_at"#,
        )
        .bind(&state.thread_id)
        .bind(json)
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
