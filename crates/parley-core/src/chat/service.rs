//! Chat service -- one turn from inbound request to persisted reply.
//!
//! Wraps the orchestrator with everything that happens under the thread
//! lock around it: thread registration, the user append, the assistant
//! append, and the response history read.

use chrono::Utc;
use parley_types::chat::{ChatMessage, MessageRole, MessageView, TurnRequest, TurnResponse};
use parley_types::config::ParleyConfig;
use parley_types::error::{CompletionError, RepositoryError, TurnError};
use parley_types::thread::Thread;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::llm::backend::CompletionBackend;
use crate::llm::token::TokenCounter;
use crate::repository::checkpoint::CheckpointStore;
use crate::repository::message::MessageStore;
use crate::repository::thread::ThreadRegistry;
use crate::turn::{ThreadLocks, TurnContext, TurnOrchestrator, TurnSettings};

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub turn: TurnSettings,
    pub default_language: String,
    /// Messages returned to the caller after each turn.
    pub response_history_limit: usize,
}

impl ChatSettings {
    pub fn from_config(config: &ParleyConfig) -> Self {
        Self {
            turn: TurnSettings::from_config(config),
            default_language: config.default_language.clone(),
            response_history_limit: config.response_history_limit.max(1),
        }
    }
}

pub struct ChatService<M, T, C, B> {
    orchestrator: TurnOrchestrator<M, C, B>,
    threads: T,
    locks: ThreadLocks,
    default_language: String,
    response_history_limit: usize,
}

impl<M, T, C, B> ChatService<M, T, C, B>
where
    M: MessageStore,
    T: ThreadRegistry,
    C: CheckpointStore,
    B: CompletionBackend,
{
    pub fn new(messages: M, threads: T, checkpoints: C, backend: B, settings: ChatSettings) -> Self {
        Self {
            orchestrator: TurnOrchestrator::new(messages, checkpoints, backend, settings.turn),
            threads,
            locks: ThreadLocks::new(),
            default_language: settings.default_language,
            response_history_limit: settings.response_history_limit,
        }
    }

    pub fn messages(&self) -> &M {
        self.orchestrator.messages()
    }

    pub fn threads(&self) -> &T {
        &self.threads
    }

    pub fn checkpoints(&self) -> &C {
        self.orchestrator.checkpoints()
    }

    /// Whether a turn currently holds `thread_id`.
    pub fn is_thread_busy(&self, thread_id: &str) -> bool {
        self.locks.try_acquire(thread_id).is_none()
    }

    /// Run one turn on `request.thread_id`.
    ///
    /// Turns on the same thread are serialized; the lock is taken before the
    /// user message is appended and released only after the turn finished or
    /// failed. Resubmitting a request with the same `turn_id` returns the
    /// recorded reply without another completion call.
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        cancel: CancellationToken,
    ) -> Result<TurnResponse, TurnError> {
        let turn_id = request.turn_id.unwrap_or_else(Uuid::now_v7);
        let span = info_span!(
            "chat.turn",
            thread_id = %request.thread_id,
            user_id = %request.user_id,
            turn_id = %turn_id,
        );

        async move {
            let _guard = self.locks.acquire(&request.thread_id).await;
            let result = if cancel.is_cancelled() {
                Err(CompletionError::Cancelled.into())
            } else {
                self.locked_turn(&request, turn_id, &cancel).await
            };
            if let Err(ref e) = result {
                warn!(error = %e, retryable = e.is_retryable(), "turn failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn locked_turn(
        &self,
        request: &TurnRequest,
        turn_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<TurnResponse, TurnError> {
        let thread_id = request.thread_id.as_str();
        let existing = self.threads.get(thread_id).await?;
        let language = request
            .language
            .clone()
            .or_else(|| existing.as_ref().map(|t| t.language.clone()))
            .unwrap_or_else(|| self.default_language.clone());

        let store = self.orchestrator.messages();
        if store
            .find_by_turn(thread_id, &turn_id, MessageRole::Assistant)
            .await?
            .is_some()
        {
            info!("turn already persisted, returning stored history");
            return self.respond(thread_id, language, turn_id, true).await;
        }

        // Content the counter refuses would fail every later window of the
        // thread, so it is rejected before anything is written.
        let draft = ChatMessage::user(thread_id, turn_id, request.text.as_str());
        self.orchestrator.backend().count_tokens(&draft)?;

        let now = Utc::now();
        let mut thread =
            existing.unwrap_or_else(|| Thread::new(thread_id, &request.user_id, &language, now));
        thread.user_id = request.user_id.clone();
        thread.language = language.clone();
        thread.last_updated = now;
        self.threads.upsert(&thread).await?;

        let user_message = store.append(&draft).await?;

        let ctx = TurnContext {
            thread_id: thread_id.to_string(),
            language: language.clone(),
            user_message,
        };
        let outcome = self.orchestrator.run(&ctx, cancel).await?;

        let reply = store.append(&outcome.reply).await?;
        thread.last_updated = Utc::now();
        self.threads.upsert(&thread).await?;

        info!(
            replayed = outcome.replayed,
            reply_seq = ?reply.seq,
            output_tokens = ?reply.output_tokens,
            "turn persisted"
        );
        self.respond(thread_id, language, turn_id, outcome.replayed).await
    }

    async fn respond(
        &self,
        thread_id: &str,
        language: String,
        turn_id: Uuid,
        replayed: bool,
    ) -> Result<TurnResponse, TurnError> {
        let messages = self.history(thread_id, self.response_history_limit).await?;
        Ok(TurnResponse {
            messages: messages.iter().map(MessageView::from).collect(),
            language,
            turn_id,
            replayed,
        })
    }

    /// The newest `limit` messages of a thread, oldest first.
    pub async fn history(
        &self,
        thread_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let mut messages = self.orchestrator.messages().recent(thread_id, limit).await?;
        messages.reverse();
        Ok(messages)
    }

    pub async fn thread(&self, thread_id: &str) -> Result<Option<Thread>, RepositoryError> {
        self.threads.get(thread_id).await
    }

    pub async fn threads_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Thread>, RepositoryError> {
        self.threads.list_for_user(user_id, limit).await
    }
}
