//! TurnOrchestrator -- drives the turn state machine.
//!
//! Executes the effect requested by each transition against the message
//! store, the checkpoint store, and the completion backend, and feeds the
//! outcome back into [`TurnState::apply`]. The completion call is the only
//! step that can be cancelled or time out.

use std::time::{Duration, Instant};

use parley_types::chat::{ChatMessage, MessageRole};
use parley_types::config::ParleyConfig;
use parley_types::error::{CompletionError, TurnError};
use parley_types::session::SessionState;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::state::{Effect, TurnContext, TurnEvent, TurnState};
use crate::context::{Window, WindowPolicy, build_window};
use crate::llm::backend::CompletionBackend;
use crate::repository::checkpoint::CheckpointStore;
use crate::repository::message::MessageStore;

/// Per-turn limits, fixed at startup.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub system_instruction: String,
    pub window: WindowPolicy,
    /// Persisted messages loaded per turn, independent of the token budget.
    pub retrieval_cap: usize,
    pub request_timeout: Duration,
}

impl TurnSettings {
    pub fn from_config(config: &ParleyConfig) -> Self {
        Self {
            system_instruction: config.system_instruction.clone(),
            window: WindowPolicy {
                max_tokens: config.token_budget,
                include_system: config.include_system,
            },
            retrieval_cap: config.retrieval_cap.max(1),
            request_timeout: config.request_timeout(),
        }
    }
}

/// A turn that reached PERSISTED.
#[derive(Debug)]
pub struct TurnOutcome {
    /// Assistant reply, not yet appended to the message store.
    pub reply: ChatMessage,
    pub session: SessionState,
    pub replayed: bool,
}

pub struct TurnOrchestrator<M, C, B> {
    messages: M,
    checkpoints: C,
    backend: B,
    settings: TurnSettings,
}

impl<M, C, B> TurnOrchestrator<M, C, B>
where
    M: MessageStore,
    C: CheckpointStore,
    B: CompletionBackend,
{
    pub fn new(messages: M, checkpoints: C, backend: B, settings: TurnSettings) -> Self {
        Self {
            messages,
            checkpoints,
            backend,
            settings,
        }
    }

    pub fn messages(&self) -> &M {
        &self.messages
    }

    pub fn checkpoints(&self) -> &C {
        &self.checkpoints
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// Run one turn to a terminal state.
    ///
    /// The caller must hold the thread's lock and must already have appended
    /// `ctx.user_message`. On success the reply still has to be appended;
    /// on failure nothing has been checkpointed.
    pub async fn run(
        &self,
        ctx: &TurnContext,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let turn_id = ctx.turn_id();
        let started = TurnState::start();
        let mut state = started.state;
        let mut effect = started.effect;

        loop {
            let event = match (&state, effect) {
                (_, Effect::Deliver | Effect::Abort) => break,
                (TurnState::Loading, Effect::LoadHistory) => self.load(ctx).await,
                (TurnState::Windowing { history }, Effect::BuildWindow) => self.window(history),
                (TurnState::Generating { window, .. }, Effect::CallBackend) => {
                    self.generate(ctx, window, cancel).await
                }
                (TurnState::Merging { session, .. }, Effect::WriteCheckpoint) => {
                    self.checkpoint(session).await
                }
                (state, effect) => TurnEvent::Failed(TurnError::Internal(format!(
                    "effect {effect:?} requested in state {}",
                    state.phase()
                ))),
            };

            let from = state.phase();
            let step = state
                .apply(ctx, event)
                .map_err(|e| TurnError::Internal(e.to_string()))?;
            debug!(
                thread_id = %ctx.thread_id,
                turn_id = %turn_id,
                from = %from,
                to = %step.state.phase(),
                "turn transition"
            );
            state = step.state;
            effect = step.effect;
        }

        match state {
            TurnState::Persisted {
                session,
                reply,
                replayed,
            } => Ok(TurnOutcome {
                reply,
                session,
                replayed,
            }),
            TurnState::Failed { error } => Err(error),
            other => Err(TurnError::Internal(format!(
                "turn stopped in non-terminal state {}",
                other.phase()
            ))),
        }
    }

    /// Load recent history, or the checkpointed reply when this turn's user
    /// message is still the newest one and the checkpoint already records it.
    async fn load(&self, ctx: &TurnContext) -> TurnEvent {
        let mut history = match self
            .messages
            .recent(&ctx.thread_id, self.settings.retrieval_cap)
            .await
        {
            Ok(history) => history,
            Err(e) => return TurnEvent::Failed(e.into()),
        };
        history.reverse();

        // A superseded turn is never replayed; the state machine rejects it.
        if history.last().is_some_and(|m| m.id == ctx.user_message.id) {
            match self.checkpoints.get(&ctx.thread_id).await {
                Ok(Some(session)) if session.records_turn(ctx.turn_id(), ctx.user_message.id) => {
                    info!(
                        thread_id = %ctx.thread_id,
                        turn_id = %ctx.turn_id(),
                        "turn already checkpointed, replaying reply"
                    );
                    return TurnEvent::Replayed { session };
                }
                Ok(_) => {}
                Err(e) => return TurnEvent::Failed(e.into()),
            }
        }

        TurnEvent::Loaded { history }
    }

    fn window(&self, history: &[ChatMessage]) -> TurnEvent {
        match build_window(history, &self.settings.window, &self.backend) {
            Ok(window) => {
                debug!(
                    before = history.len(),
                    after = window.len(),
                    tokens = window.token_count,
                    over_budget = ?window.over_budget,
                    "context window built"
                );
                TurnEvent::Windowed(window)
            }
            Err(e) => TurnEvent::Failed(e.into()),
        }
    }

    async fn generate(
        &self,
        ctx: &TurnContext,
        window: &Window,
        cancel: &CancellationToken,
    ) -> TurnEvent {
        let started = Instant::now();
        let timeout = self.settings.request_timeout;
        let call = self
            .backend
            .generate(&self.settings.system_instruction, &window.messages);

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(CompletionError::Cancelled),
            outcome = tokio::time::timeout(timeout, call) => {
                outcome.unwrap_or_else(|_| Err(CompletionError::Timeout(timeout.as_secs())))
            }
        };

        match result {
            Ok(generation) => {
                let mut reply = ChatMessage::new(
                    &ctx.thread_id,
                    ctx.turn_id(),
                    MessageRole::Assistant,
                    generation.content,
                );
                reply.model = Some(generation.model);
                reply.input_tokens = Some(generation.input_tokens);
                reply.output_tokens = Some(generation.output_tokens);
                reply.stop_reason = Some(generation.stop_reason.to_string());
                reply.response_ms = Some(started.elapsed().as_millis() as u64);
                TurnEvent::Generated(reply)
            }
            Err(e) => TurnEvent::Failed(e.into()),
        }
    }

    async fn checkpoint(&self, session: &SessionState) -> TurnEvent {
        match self.checkpoints.put(session).await {
            Ok(()) => TurnEvent::Checkpointed,
            Err(e) => TurnEvent::Failed(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryCheckpoints, MemoryMessages, ScriptedBackend};
    use parley_types::error::RepositoryError;
    use parley_types::llm::LlmError;
    use parley_types::session::TurnReceipt;
    use uuid::Uuid;

    fn settings() -> TurnSettings {
        TurnSettings {
            system_instruction: "Be polite.".into(),
            window: WindowPolicy::default(),
            retrieval_cap: 20,
            request_timeout: Duration::from_secs(5),
        }
    }

    fn orchestrator(
        backend: ScriptedBackend,
        settings: TurnSettings,
    ) -> TurnOrchestrator<MemoryMessages, MemoryCheckpoints, ScriptedBackend> {
        TurnOrchestrator::new(
            MemoryMessages::default(),
            MemoryCheckpoints::default(),
            backend,
            settings,
        )
    }

    async fn inbound(
        orch: &TurnOrchestrator<MemoryMessages, MemoryCheckpoints, ScriptedBackend>,
        text: &str,
    ) -> TurnContext {
        let stored = orch
            .messages()
            .append(&ChatMessage::user("t-1", Uuid::now_v7(), text))
            .await
            .unwrap();
        TurnContext {
            thread_id: "t-1".into(),
            language: "english".into(),
            user_message: stored,
        }
    }

    #[tokio::test]
    async fn test_turn_reaches_persisted_and_checkpoints() {
        let orch = orchestrator(ScriptedBackend::replying("hello there"), settings());
        let ctx = inbound(&orch, "hi").await;

        let outcome = orch.run(&ctx, &CancellationToken::new()).await.unwrap();

        assert!(!outcome.replayed);
        assert_eq!(outcome.reply.content, "hello there #1");
        assert_eq!(outcome.reply.role, MessageRole::Assistant);
        assert_eq!(outcome.reply.turn_id, ctx.turn_id());
        assert_eq!(outcome.reply.model.as_deref(), Some("scripted"));
        assert!(outcome.reply.response_ms.is_some());

        let checkpoint = orch.checkpoints().get("t-1").await.unwrap().unwrap();
        assert!(checkpoint.records_turn(ctx.turn_id(), ctx.user_message.id));
        assert_eq!(checkpoint.messages.len(), 2);

        // The reply is handed back, not appended.
        assert_eq!(orch.messages().count("t-1").await.unwrap(), 1);

        let calls = orch.backend().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system, "Be polite.");
        assert_eq!(calls[0].contents, vec!["hi".to_string()]);
    }

    #[tokio::test]
    async fn test_history_is_capped_by_retrieval_limit() {
        let mut limited = settings();
        limited.retrieval_cap = 4;
        let orch = orchestrator(ScriptedBackend::replying("ok"), limited);
        for i in 0..10 {
            let turn = Uuid::now_v7();
            orch.messages()
                .append(&ChatMessage::user("t-1", turn, format!("q{i}")))
                .await
                .unwrap();
            orch.messages()
                .append(&ChatMessage::new("t-1", turn, MessageRole::Assistant, format!("a{i}")))
                .await
                .unwrap();
        }
        let ctx = inbound(&orch, "latest").await;

        orch.run(&ctx, &CancellationToken::new()).await.unwrap();

        let calls = orch.backend().calls();
        // Four newest persisted messages (inbound included), window starts on a user turn.
        assert_eq!(calls[0].contents, vec!["q9", "a9", "latest"]);
        let checkpoint = orch.checkpoints().get("t-1").await.unwrap().unwrap();
        let live: Vec<_> = checkpoint.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(live, vec!["a8", "q9", "a9", "latest", "ok #1"]);
    }

    #[tokio::test]
    async fn test_checkpointed_turn_is_replayed_without_backend_call() {
        let orch = orchestrator(ScriptedBackend::replying("fresh"), settings());
        let ctx = inbound(&orch, "hi").await;
        let recorded = ChatMessage::new("t-1", ctx.turn_id(), MessageRole::Assistant, "recorded");
        orch.checkpoints()
            .put(&SessionState {
                thread_id: "t-1".into(),
                messages: vec![ctx.user_message.clone(), recorded.clone()],
                language: "english".into(),
                last_updated: recorded.created_at,
                last_turn: Some(TurnReceipt {
                    turn_id: ctx.turn_id(),
                    user_message_id: ctx.user_message.id,
                    reply: recorded.clone(),
                }),
            })
            .await
            .unwrap();

        let outcome = orch.run(&ctx, &CancellationToken::new()).await.unwrap();

        assert!(outcome.replayed);
        assert_eq!(outcome.reply, recorded);
        assert!(orch.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn test_checkpoint_of_other_turn_is_not_replayed() {
        let orch = orchestrator(ScriptedBackend::replying("fresh"), settings());
        let first = inbound(&orch, "first").await;
        orch.run(&first, &CancellationToken::new()).await.unwrap();

        let second = inbound(&orch, "second").await;
        let outcome = orch.run(&second, &CancellationToken::new()).await.unwrap();

        assert!(!outcome.replayed);
        assert_eq!(orch.backend().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_superseded_turn_is_rejected_before_backend() {
        let orch = orchestrator(ScriptedBackend::replying("r"), settings());
        let first = inbound(&orch, "first").await;
        let second = inbound(&orch, "second").await;
        orch.run(&second, &CancellationToken::new()).await.unwrap();

        let err = orch.run(&first, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, TurnError::Stale(id) if id == first.turn_id()));
        assert!(!err.is_retryable());
        assert_eq!(orch.backend().calls().len(), 1);
        let checkpoint = orch.checkpoints().get("t-1").await.unwrap().unwrap();
        assert!(checkpoint.records_turn(second.turn_id(), second.user_message.id));
    }

    #[tokio::test]
    async fn test_checkpointed_turn_is_not_replayed_after_later_message() {
        let orch = orchestrator(ScriptedBackend::replying("r"), settings());
        let first = inbound(&orch, "first").await;
        orch.run(&first, &CancellationToken::new()).await.unwrap();
        // The reply was never appended, and a later question arrived.
        inbound(&orch, "second").await;

        let err = orch.run(&first, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, TurnError::Stale(_)));
        assert_eq!(orch.backend().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_fails_without_checkpoint() {
        let mut short = settings();
        short.request_timeout = Duration::from_millis(20);
        let backend = ScriptedBackend::replying("late").with_delay(Duration::from_millis(500));
        let orch = orchestrator(backend, short);
        let ctx = inbound(&orch, "hi").await;

        let err = orch.run(&ctx, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, TurnError::Completion(CompletionError::Timeout(_))));
        assert!(err.is_retryable());
        assert!(orch.checkpoints().get("t-1").await.unwrap().is_none());
        // User message kept, no assistant message.
        assert_eq!(orch.messages().count("t-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_fails_without_checkpoint() {
        let backend = ScriptedBackend::replying("never").with_delay(Duration::from_secs(5));
        let orch = orchestrator(backend, settings());
        let ctx = inbound(&orch, "hi").await;
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            })
        };
        let err = orch.run(&ctx, &cancel).await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, TurnError::Completion(CompletionError::Cancelled)));
        assert!(orch.checkpoints().get("t-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backend_error_is_classified() {
        let orch = orchestrator(
            ScriptedBackend::failing(LlmError::AuthenticationFailed),
            settings(),
        );
        let ctx = inbound(&orch, "hi").await;

        let err = orch.run(&ctx, &CancellationToken::new()).await.unwrap_err();

        assert!(!err.is_retryable());
        assert!(orch.checkpoints().get("t-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tokenization_failure_skips_backend() {
        let orch = orchestrator(ScriptedBackend::replying("x"), settings());
        let ctx = inbound(&orch, "bad\0input").await;

        let err = orch.run(&ctx, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, TurnError::Tokenization(_)));
        assert!(orch.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn test_checkpoint_write_failure_fails_turn() {
        let orch = orchestrator(ScriptedBackend::replying("x"), settings());
        orch.checkpoints().fail_puts(true);
        let ctx = inbound(&orch, "hi").await;

        let err = orch.run(&ctx, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, TurnError::Store(RepositoryError::Connection)));
        assert_eq!(orch.backend().calls().len(), 1);
    }
}
