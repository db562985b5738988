//! SQLite thread registry implementation.

use parley_core::repository::thread::ThreadRegistry;
use parley_types::error::RepositoryError;
use parley_types::thread::Thread;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, map_sqlx_error, parse_datetime};

/// SQLite-backed implementation of `ThreadRegistry`.
pub struct SqliteThreadRegistry {
    pool: DatabasePool,
}

impl SqliteThreadRegistry {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct ThreadRow {
    thread_id: String,
    user_id: String,
    language: String,
    created_at: String,
    last_updated: String,
}

impl ThreadRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            thread_id: row.try_get("thread_id")?,
            user_id: row.try_get("user_id")?,
            language: row.try_get("language")?,
            created_at: row.try_get("created_at")?,
            last_updated: row.try_get("last_updated")?,
        })
    }

    fn into_thread(self) -> Result<Thread, RepositoryError> {
        Ok(Thread {
            thread_id: self.thread_id,
            user_id: self.user_id,
            language: self.language,
            created_at: parse_datetime(&self.created_at)?,
            last_updated: parse_datetime(&self.last_updated)?,
        })
    }
}

impl ThreadRegistry for SqliteThreadRegistry {
    async fn upsert(&self, thread: &Thread) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO threads (thread_id, user_id, language, created_at, last_updated)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(thread_id) DO UPDATE SET
                user_id = excluded.user_id,
                language = excluded.language,
                last_updated = excluded.last_updated"#,
        )
        .bind(&thread.thread_id)
        .bind(&thread.user_id)
        .bind(&thread.language)
        .bind(format_datetime(&thread.created_at))
        .bind(format_datetime(&thread.last_updated))
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn get(&self, thread_id: &str) -> Result<Option<Thread>, RepositoryError> {
        let row = sqlx::query(
            "SELECT thread_id, user_id, language, created_at, last_updated FROM threads WHERE thread_id = ?1",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => {
                let r = ThreadRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_thread()?))
            }
            None => Ok(None),
        }
    }

    async fn list_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<Thread>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT thread_id, user_id, language, created_at, last_updated FROM threads
            WHERE user_id = ?1 ORDER BY last_updated DESC LIMIT ?2"#,
        )
        .bind(user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| {
                ThreadRow::from_row(row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?
                    .into_thread()
            })
            .collect()
    }
}
