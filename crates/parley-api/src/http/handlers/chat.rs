//! Turn endpoint.
//!
//! `POST /chat/` runs exactly one turn and returns the thread's recent
//! history. The turn runs on its own task; if the client disconnects, the
//! handler future is dropped, the drop guard cancels the turn, and the task
//! records the failure before releasing the thread.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use tokio_util::sync::CancellationToken;

use parley_types::chat::{TurnRequest, TurnResponse};

use crate::http::error::AppError;
use crate::state::AppState;

/// Longest accepted `user_id` or `thread_id`.
pub const MAX_ID_LEN: usize = 128;

/// Largest accepted message text, in bytes.
pub const MAX_TEXT_BYTES: usize = 32 * 1024;

fn validate_id(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    if value.chars().count() > MAX_ID_LEN {
        return Err(AppError::Validation(format!(
            "{field} must be at most {MAX_ID_LEN} characters"
        )));
    }
    Ok(())
}

pub(crate) fn validate_turn_request(request: &TurnRequest) -> Result<(), AppError> {
    validate_id("user_id", &request.user_id)?;
    validate_id("thread_id", &request.thread_id)?;
    if request.text.trim().is_empty() {
        return Err(AppError::Validation("text must not be empty".to_string()));
    }
    if request.text.len() > MAX_TEXT_BYTES {
        return Err(AppError::Validation(format!(
            "text must be at most {MAX_TEXT_BYTES} bytes"
        )));
    }
    if request.text.contains('\0') {
        return Err(AppError::Validation(
            "text must not contain NUL characters".to_string(),
        ));
    }
    Ok(())
}

/// POST /chat/ - Run one turn.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    validate_turn_request(&request)?;

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let service = Arc::clone(&state.chat_service);
    let turn = tokio::spawn(async move { service.run_turn(request, cancel).await });

    let result = turn
        .await
        .map_err(|e| AppError::Internal(format!("turn task failed: {e}")))?;
    let _ = guard.disarm();

    Ok(Json(result?))
}
