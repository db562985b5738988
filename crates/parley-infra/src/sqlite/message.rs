//! SQLite message store implementation.
//!
//! Implements `MessageStore` from `parley-core` using raw queries, a private
//! Row struct and the split reader/writer pool. Appends are idempotent per
//! (thread_id, turn_id, role) through the table's UNIQUE constraint.

use parley_core::repository::message::MessageStore;
use parley_types::chat::{ChatMessage, MessageRole};
use parley_types::error::RepositoryError;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, map_sqlx_error, parse_datetime};

const SELECT_COLUMNS: &str = "SELECT seq, id, thread_id, turn_id, role, content, created_at, \
     input_tokens, output_tokens, model, stop_reason, response_ms FROM chat_messages";

/// SQLite-backed implementation of `MessageStore`.
pub struct SqliteMessageStore {
    pool: DatabasePool,
}

impl SqliteMessageStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Internal row type for mapping SQLite rows to domain ChatMessage.
struct ChatMessageRow {
    seq: i64,
    id: String,
    thread_id: String,
    turn_id: String,
    role: String,
    content: String,
    created_at: String,
    input_tokens: Option<i64>,
    output_tokens: Option<i64>,
    model: Option<String>,
    stop_reason: Option<String>,
    response_ms: Option<i64>,
}

impl ChatMessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            seq: row.try_get("seq")?,
            id: row.try_get("id")?,
            thread_id: row.try_get("thread_id")?,
            turn_id: row.try_get("turn_id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
            input_tokens: row.try_get("input_tokens")?,
            output_tokens: row.try_get("output_tokens")?,
            model: row.try_get("model")?,
            stop_reason: row.try_get("stop_reason")?,
            response_ms: row.try_get("response_ms")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid message id: {e}")))?;
        let turn_id = Uuid::parse_str(&self.turn_id)
            .map_err(|e| RepositoryError::Query(format!("invalid turn_id: {e}")))?;
        let role: MessageRole = self
            .role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let created_at = parse_datetime(&self.created_at)?;

        Ok(ChatMessage {
            id,
            thread_id: self.thread_id,
            turn_id,
            seq: Some(self.seq),
            role,
            content: self.content,
            created_at,
            input_tokens: self.input_tokens.map(|v| v as u32),
            output_tokens: self.output_tokens.map(|v| v as u32),
            model: self.model,
            stop_reason: self.stop_reason,
            response_ms: self.response_ms.map(|v| v as u64),
        })
    }
}

fn rows_to_messages(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<ChatMessage>, RepositoryError> {
    rows.iter()
        .map(|row| {
            ChatMessageRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_message()
        })
        .collect()
}

impl MessageStore for SqliteMessageStore {
    async fn append(&self, message: &ChatMessage) -> Result<ChatMessage, RepositoryError> {
        sqlx::query(
            r#"INSERT INTO chat_messages (id, thread_id, turn_id, role, content, created_at,
                input_tokens, output_tokens, model, stop_reason, response_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(thread_id, turn_id, role) DO NOTHING"#,
        )
        .bind(message.id.to_string())
        .bind(&message.thread_id)
        .bind(message.turn_id.to_string())
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(format_datetime(&message.created_at))
        .bind(message.input_tokens.map(|v| v as i64))
        .bind(message.output_tokens.map(|v| v as i64))
        .bind(&message.model)
        .bind(&message.stop_reason)
        .bind(message.response_ms.map(|v| v as i64))
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;

        // Read back on the writer so the row is visible without waiting on WAL readers.
        let sql = format!("{SELECT_COLUMNS} WHERE thread_id = ?1 AND turn_id = ?2 AND role = ?3");
        let row = sqlx::query(&sql)
            .bind(&message.thread_id)
            .bind(message.turn_id.to_string())
            .bind(message.role.to_string())
            .fetch_one(&self.pool.writer)
            .await
            .map_err(map_sqlx_error)?;

        ChatMessageRow::from_row(&row)
            .map_err(|e| RepositoryError::Query(e.to_string()))?
            .into_message()
    }

    async fn recent(&self, thread_id: &str, limit: usize) -> Result<Vec<ChatMessage>, RepositoryError> {
        let sql = format!("{SELECT_COLUMNS} WHERE thread_id = ?1 ORDER BY created_at DESC, seq DESC LIMIT ?2");
        let rows = sqlx::query(&sql)
            .bind(thread_id)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(map_sqlx_error)?;

        rows_to_messages(&rows)
    }

    async fn find_by_turn(
        &self,
        thread_id: &str,
        turn_id: &Uuid,
        role: MessageRole,
    ) -> Result<Option<ChatMessage>, RepositoryError> {
        let sql = format!("{SELECT_COLUMNS} WHERE thread_id = ?1 AND turn_id = ?2 AND role = ?3");
        let row = sqlx::query(&sql)
            .bind(thread_id)
            .bind(turn_id.to_string())
            .bind(role.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => {
                let r = ChatMessageRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_message()?))
            }
            None => Ok(None),
        }
    }

    async fn count(&self, thread_id: &str) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM chat_messages WHERE thread_id = ?1")
            .bind(thread_id)
            .fetch_one(&self.pool.reader)
            .await
            .map_err(map_sqlx_error)?;

        let count: i64 = row
            .try_get("count")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(count as u64)
    }
}
