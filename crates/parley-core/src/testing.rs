//! In-memory ports for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parley_types::chat::{ChatMessage, MessageRole};
use parley_types::error::{CompletionError, RepositoryError, TokenizationError};
use parley_types::llm::{LlmError, StopReason};
use parley_types::session::SessionState;
use parley_types::thread::Thread;
use uuid::Uuid;

use crate::llm::backend::{CompletionBackend, Generation};
use crate::llm::token::{HeuristicTokenCounter, TokenCounter};
use crate::repository::checkpoint::CheckpointStore;
use crate::repository::message::MessageStore;
use crate::repository::thread::ThreadRegistry;

#[derive(Default)]
pub struct MemoryMessages {
    rows: Mutex<Vec<ChatMessage>>,
    fail_next: Mutex<Option<MessageRole>>,
}

impl MemoryMessages {
    /// Make the next append of `role` fail with a connection error.
    pub fn fail_next_append(&self, role: MessageRole) {
        *self.fail_next.lock().unwrap() = Some(role);
    }
}

impl MessageStore for MemoryMessages {
    async fn append(&self, message: &ChatMessage) -> Result<ChatMessage, RepositoryError> {
        {
            let mut fail = self.fail_next.lock().unwrap();
            if *fail == Some(message.role) {
                *fail = None;
                return Err(RepositoryError::Connection);
            }
        }
        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows.iter().find(|m| {
            m.thread_id == message.thread_id && m.turn_id == message.turn_id && m.role == message.role
        }) {
            return Ok(existing.clone());
        }
        let mut stored = message.clone();
        stored.seq = Some(rows.len() as i64 + 1);
        rows.push(stored.clone());
        Ok(stored)
    }

    async fn recent(&self, thread_id: &str, limit: usize) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = self.rows.lock().unwrap();
        let mut thread: Vec<_> = rows.iter().filter(|m| m.thread_id == thread_id).cloned().collect();
        thread.sort_by(|a, b| (b.created_at, b.seq).cmp(&(a.created_at, a.seq)));
        thread.truncate(limit);
        Ok(thread)
    }

    async fn find_by_turn(
        &self,
        thread_id: &str,
        turn_id: &Uuid,
        role: MessageRole,
    ) -> Result<Option<ChatMessage>, RepositoryError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .find(|m| m.thread_id == thread_id && m.turn_id == *turn_id && m.role == role)
            .cloned())
    }

    async fn count(&self, thread_id: &str) -> Result<u64, RepositoryError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().filter(|m| m.thread_id == thread_id).count() as u64)
    }
}

#[derive(Default)]
pub struct MemoryThreads {
    threads: Mutex<HashMap<String, Thread>>,
}

impl ThreadRegistry for MemoryThreads {
    async fn upsert(&self, thread: &Thread) -> Result<(), RepositoryError> {
        let mut threads = self.threads.lock().unwrap();
        let created_at = threads
            .get(&thread.thread_id)
            .map_or(thread.created_at, |t| t.created_at);
        let mut stored = thread.clone();
        stored.created_at = created_at;
        threads.insert(thread.thread_id.clone(), stored);
        Ok(())
    }

    async fn get(&self, thread_id: &str) -> Result<Option<Thread>, RepositoryError> {
        Ok(self.threads.lock().unwrap().get(thread_id).cloned())
    }

    async fn list_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<Thread>, RepositoryError> {
        let threads = self.threads.lock().unwrap();
        let mut owned: Vec<_> = threads.values().filter(|t| t.user_id == user_id).cloned().collect();
        owned.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        owned.truncate(limit);
        Ok(owned)
    }
}

#[derive(Default)]
pub struct MemoryCheckpoints {
    states: Mutex<HashMap<String, SessionState>>,
    fail_puts: AtomicBool,
}

impl MemoryCheckpoints {
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }
}

impl CheckpointStore for MemoryCheckpoints {
    async fn get(&self, thread_id: &str) -> Result<Option<SessionState>, RepositoryError> {
        Ok(self.states.lock().unwrap().get(thread_id).cloned())
    }

    async fn put(&self, state: &SessionState) -> Result<(), RepositoryError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        self.states
            .lock()
            .unwrap()
            .insert(state.thread_id.clone(), state.clone());
        Ok(())
    }
}

/// What a backend call was given.
#[derive(Debug, Clone)]
pub struct BackendCall {
    pub system: String,
    pub contents: Vec<String>,
}

/// Replies `"{text} #{n}"` to the n-th call, optionally after a delay.
pub struct ScriptedBackend {
    text: String,
    delay: Option<Duration>,
    /// Returned from the first call instead of a reply.
    failure: Mutex<Option<LlmError>>,
    calls: Mutex<Vec<BackendCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    pub fn replying(text: &str) -> Self {
        Self {
            text: text.to_string(),
            delay: None,
            failure: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: LlmError) -> Self {
        let backend = Self::replying("recovered");
        *backend.failure.lock().unwrap() = Some(error);
        backend
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl TokenCounter for ScriptedBackend {
    fn count_tokens(&self, message: &ChatMessage) -> Result<u32, TokenizationError> {
        HeuristicTokenCounter.count_tokens(message)
    }
}

impl CompletionBackend for ScriptedBackend {
    async fn generate(
        &self,
        system_instruction: &str,
        messages: &[ChatMessage],
    ) -> Result<Generation, CompletionError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(BackendCall {
                system: system_instruction.to_string(),
                contents: messages.iter().map(|m| m.content.clone()).collect(),
            });
            calls.len()
        };
        if let Some(error) = self.failure.lock().unwrap().take() {
            return Err(error.into());
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(Generation {
            content: format!("{} #{n}", self.text),
            model: "scripted".to_string(),
            input_tokens: messages.len() as u32,
            output_tokens: 1,
            stop_reason: StopReason::EndTurn,
        })
    }
}
