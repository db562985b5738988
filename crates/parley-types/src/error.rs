use thiserror::Error;

use crate::llm::LlmError;

/// Errors from repository operations (used by trait definitions in parley-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// A message whose token count could not be computed.
#[derive(Debug, Error)]
#[error("cannot count tokens for message {message_id}: {reason}")]
pub struct TokenizationError {
    pub message_id: uuid::Uuid,
    pub reason: String,
}

/// Failure of the completion step of a turn.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error(transparent)]
    Backend(#[from] LlmError),

    #[error("completion timed out after {0}s")]
    Timeout(u64),

    #[error("completion cancelled")]
    Cancelled,
}

/// Why a turn ended in the failed state.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Tokenization(#[from] TokenizationError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("store error: {0}")]
    Store(#[from] RepositoryError),

    /// A resubmitted turn whose user message is no longer the newest
    /// message of its thread. Answering it would reorder history.
    #[error("turn {0} is superseded by a later message on the thread")]
    Stale(uuid::Uuid),

    /// The state machine received an event it has no transition for.
    #[error("invalid turn transition: {0}")]
    Internal(String),
}

impl TurnError {
    /// Whether the caller may resubmit the same turn.
    ///
    /// Every failure leaves the message store with at most the inbound user
    /// message appended, so a retry never duplicates anything.
    pub fn is_retryable(&self) -> bool {
        match self {
            TurnError::Tokenization(_) => true,
            TurnError::Completion(CompletionError::Backend(e)) => e.is_transient(),
            TurnError::Completion(_) => true,
            TurnError::Store(RepositoryError::Connection) => true,
            TurnError::Store(_) => false,
            TurnError::Stale(_) => false,
            TurnError::Internal(_) => false,
        }
    }

    /// Short machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            TurnError::Tokenization(_) => "TOKENIZATION_FAILED",
            TurnError::Completion(CompletionError::Timeout(_)) => "COMPLETION_TIMEOUT",
            TurnError::Completion(CompletionError::Cancelled) => "COMPLETION_CANCELLED",
            TurnError::Completion(CompletionError::Backend(_)) => "COMPLETION_FAILED",
            TurnError::Store(_) => "STORE_ERROR",
            TurnError::Stale(_) => "STALE_TURN",
            TurnError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
