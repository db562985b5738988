//! Read-only thread and history handlers.
//!
//! Endpoints:
//! - GET /api/v1/threads/{id}          - Thread metadata
//! - GET /api/v1/threads/{id}/messages - Recent messages, oldest first
//! - GET /api/v1/users/{id}/threads    - Threads for a user

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use parley_types::chat::MessageView;
use parley_types::thread::Thread;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Upper bound for any `limit` query parameter.
const MAX_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    #[serde(default = "default_message_limit")]
    pub limit: usize,
}

fn default_message_limit() -> usize {
    20
}

#[derive(Debug, Deserialize)]
pub struct ThreadListQuery {
    #[serde(default = "default_thread_limit")]
    pub limit: usize,
}

fn default_thread_limit() -> usize {
    50
}

fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_LIMIT)
}

async fn require_thread(state: &AppState, thread_id: &str) -> Result<Thread, AppError> {
    state
        .chat_service
        .thread(thread_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Thread '{thread_id}' not found")))
}

/// GET /api/v1/threads/{id} - Get thread metadata.
pub async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<ApiResponse<Thread>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let thread = require_thread(&state, &thread_id).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(thread, request_id, elapsed)
        .with_link("self", &format!("/api/v1/threads/{thread_id}"))
        .with_link("messages", &format!("/api/v1/threads/{thread_id}/messages"));

    Ok(Json(resp))
}

/// GET /api/v1/threads/{id}/messages - Recent messages, oldest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<ApiResponse<Vec<MessageView>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    require_thread(&state, &thread_id).await?;
    let messages = state
        .chat_service
        .history(&thread_id, clamp_limit(query.limit))
        .await?;

    let views: Vec<MessageView> = messages.iter().map(MessageView::from).collect();
    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(views, request_id, elapsed)
        .with_link("self", &format!("/api/v1/threads/{thread_id}/messages"))
        .with_link("thread", &format!("/api/v1/threads/{thread_id}"));

    Ok(Json(resp))
}

/// GET /api/v1/users/{id}/threads - Threads for a user, most recently updated first.
pub async fn list_user_threads(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ThreadListQuery>,
) -> Result<Json<ApiResponse<Vec<Thread>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let threads = state
        .chat_service
        .threads_for_user(&user_id, clamp_limit(query.limit))
        .await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(threads, request_id, elapsed)
        .with_link("self", &format!("/api/v1/users/{user_id}/threads"));

    Ok(Json(resp))
}
