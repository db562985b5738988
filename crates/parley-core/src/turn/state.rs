//! Turn state machine.
//!
//! `TurnState::apply` is a pure function from (state, event) to the next
//! state plus the effect the driver must perform next. All IO lives in the
//! orchestrator, which executes effects and feeds their outcome back as
//! events, so every transition can be tested without stores or a backend.
//!
//! ```text
//! LOADING -> WINDOWING -> GENERATING -> MERGING -> PERSISTED
//!    |           |             |           |
//!    +-----------+------> FAILED <---------+
//! LOADING -> PERSISTED  (replay of a checkpointed turn)
//! ```

use std::fmt;

use parley_types::chat::ChatMessage;
use parley_types::error::TurnError;
use parley_types::session::{SessionState, TurnReceipt};
use uuid::Uuid;

use crate::context::Window;

/// Fixed inputs of one turn.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub thread_id: String,
    pub language: String,
    /// The inbound user message, already persisted.
    pub user_message: ChatMessage,
}

impl TurnContext {
    pub fn turn_id(&self) -> Uuid {
        self.user_message.turn_id
    }
}

/// Discriminant of [`TurnState`], for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Loading,
    Windowing,
    Generating,
    Merging,
    Persisted,
    Failed,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnPhase::Loading => write!(f, "loading"),
            TurnPhase::Windowing => write!(f, "windowing"),
            TurnPhase::Generating => write!(f, "generating"),
            TurnPhase::Merging => write!(f, "merging"),
            TurnPhase::Persisted => write!(f, "persisted"),
            TurnPhase::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug)]
pub enum TurnState {
    /// Waiting for the checkpoint and recent history.
    Loading,
    /// History loaded (oldest first, inbound message last).
    Windowing { history: Vec<ChatMessage> },
    /// Window selected; the completion call is in flight.
    Generating {
        history: Vec<ChatMessage>,
        window: Window,
    },
    /// Reply generated; the checkpoint write is in flight.
    Merging {
        session: SessionState,
        reply: ChatMessage,
    },
    /// Terminal. The reply is ready for durable append.
    Persisted {
        session: SessionState,
        reply: ChatMessage,
        /// The reply came from the checkpoint, not a new completion.
        replayed: bool,
    },
    /// Terminal. No checkpoint was written by this turn.
    Failed { error: TurnError },
}

/// Outcome of the effect the orchestrator last performed.
#[derive(Debug)]
pub enum TurnEvent {
    /// Recent persisted history, oldest first.
    Loaded { history: Vec<ChatMessage> },
    /// The checkpoint already records this turn.
    Replayed { session: SessionState },
    Windowed(Window),
    Generated(ChatMessage),
    Checkpointed,
    Failed(TurnError),
}

impl TurnEvent {
    fn name(&self) -> &'static str {
        match self {
            TurnEvent::Loaded { .. } => "loaded",
            TurnEvent::Replayed { .. } => "replayed",
            TurnEvent::Windowed(_) => "windowed",
            TurnEvent::Generated(_) => "generated",
            TurnEvent::Checkpointed => "checkpointed",
            TurnEvent::Failed(_) => "failed",
        }
    }
}

/// Work the driver performs after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    LoadHistory,
    BuildWindow,
    CallBackend,
    WriteCheckpoint,
    /// Hand the reply to the caller.
    Deliver,
    /// Report the failure to the caller.
    Abort,
}

/// Result of a transition.
#[derive(Debug)]
pub struct Step {
    pub state: TurnState,
    pub effect: Effect,
}

#[derive(Debug, thiserror::Error)]
#[error("no transition from {from} on '{event}'")]
pub struct TransitionError {
    pub from: TurnPhase,
    pub event: &'static str,
}

impl TurnState {
    /// Initial state of every turn.
    pub fn start() -> Step {
        Step {
            state: TurnState::Loading,
            effect: Effect::LoadHistory,
        }
    }

    pub fn phase(&self) -> TurnPhase {
        match self {
            TurnState::Loading => TurnPhase::Loading,
            TurnState::Windowing { .. } => TurnPhase::Windowing,
            TurnState::Generating { .. } => TurnPhase::Generating,
            TurnState::Merging { .. } => TurnPhase::Merging,
            TurnState::Persisted { .. } => TurnPhase::Persisted,
            TurnState::Failed { .. } => TurnPhase::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Persisted { .. } | TurnState::Failed { .. })
    }

    pub fn apply(self, ctx: &TurnContext, event: TurnEvent) -> Result<Step, TransitionError> {
        let from = self.phase();
        match (self, event) {
            (state, TurnEvent::Failed(error)) if !state.is_terminal() => Ok(Step {
                state: TurnState::Failed { error },
                effect: Effect::Abort,
            }),

            (TurnState::Loading, TurnEvent::Loaded { history }) => {
                Ok(match with_inbound(history, &ctx.user_message) {
                    Some(history) => Step {
                        state: TurnState::Windowing { history },
                        effect: Effect::BuildWindow,
                    },
                    None => Step {
                        state: TurnState::Failed {
                            error: TurnError::Stale(ctx.turn_id()),
                        },
                        effect: Effect::Abort,
                    },
                })
            }

            (TurnState::Loading, TurnEvent::Replayed { session }) => {
                let Some(receipt) = session.last_turn.as_ref() else {
                    return Err(TransitionError {
                        from,
                        event: "replayed",
                    });
                };
                let reply = receipt.reply.clone();
                Ok(Step {
                    state: TurnState::Persisted {
                        session,
                        reply,
                        replayed: true,
                    },
                    effect: Effect::Deliver,
                })
            }

            (TurnState::Windowing { history }, TurnEvent::Windowed(window)) => Ok(Step {
                state: TurnState::Generating { history, window },
                effect: Effect::CallBackend,
            }),

            (TurnState::Generating { mut history, .. }, TurnEvent::Generated(reply)) => {
                history.push(reply.clone());
                let session = SessionState {
                    thread_id: ctx.thread_id.clone(),
                    messages: history,
                    language: ctx.language.clone(),
                    last_updated: reply.created_at,
                    last_turn: Some(TurnReceipt {
                        turn_id: ctx.turn_id(),
                        user_message_id: ctx.user_message.id,
                        reply: reply.clone(),
                    }),
                };
                Ok(Step {
                    state: TurnState::Merging { session, reply },
                    effect: Effect::WriteCheckpoint,
                })
            }

            (TurnState::Merging { session, reply }, TurnEvent::Checkpointed) => Ok(Step {
                state: TurnState::Persisted {
                    session,
                    reply,
                    replayed: false,
                },
                effect: Effect::Deliver,
            }),

            (_, event) => Err(TransitionError {
                from,
                event: event.name(),
            }),
        }
    }
}

/// Make the inbound message the last entry of the loaded slice.
///
/// Loaded messages are never moved. The inbound message is persisted before
/// loading, so it normally comes back as the newest entry and is kept where
/// it is. Returns `None` when anything newer than the inbound message was
/// loaded: the turn has been superseded and answering it would put its
/// reply after a later exchange.
fn with_inbound(mut history: Vec<ChatMessage>, inbound: &ChatMessage) -> Option<Vec<ChatMessage>> {
    match history.iter().position(|m| m.id == inbound.id) {
        Some(i) if i + 1 == history.len() => Some(history),
        Some(_) => None,
        None if history.iter().any(|m| stored_after(m, inbound)) => None,
        None => {
            history.push(inbound.clone());
            Some(history)
        }
    }
}

fn stored_after(message: &ChatMessage, inbound: &ChatMessage) -> bool {
    matches!((message.seq, inbound.seq), (Some(a), Some(b)) if a > b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OverBudget;
    use parley_types::chat::MessageRole;
    use parley_types::error::{CompletionError, RepositoryError};

    fn ctx() -> TurnContext {
        TurnContext {
            thread_id: "t-1".into(),
            language: "english".into(),
            user_message: ChatMessage::user("t-1", Uuid::now_v7(), "how are you"),
        }
    }

    fn window(messages: Vec<ChatMessage>) -> Window {
        Window {
            messages,
            token_count: 0,
            over_budget: None,
        }
    }

    fn reply(ctx: &TurnContext) -> ChatMessage {
        ChatMessage::new(&ctx.thread_id, ctx.turn_id(), MessageRole::Assistant, "fine")
    }

    #[test]
    fn test_happy_path_transitions() {
        let ctx = ctx();
        let earlier = ChatMessage::user("t-1", Uuid::now_v7(), "hi");

        let step = TurnState::start();
        assert_eq!(step.effect, Effect::LoadHistory);

        let step = step
            .state
            .apply(&ctx, TurnEvent::Loaded { history: vec![earlier.clone()] })
            .unwrap();
        assert_eq!(step.effect, Effect::BuildWindow);
        let TurnState::Windowing { history } = &step.state else {
            panic!("expected windowing, got {:?}", step.state.phase());
        };
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].id, ctx.user_message.id);

        let w = window(vec![ctx.user_message.clone()]);
        let step = step.state.apply(&ctx, TurnEvent::Windowed(w)).unwrap();
        assert_eq!(step.state.phase(), TurnPhase::Generating);
        assert_eq!(step.effect, Effect::CallBackend);

        let r = reply(&ctx);
        let step = step.state.apply(&ctx, TurnEvent::Generated(r.clone())).unwrap();
        assert_eq!(step.effect, Effect::WriteCheckpoint);
        let TurnState::Merging { session, .. } = &step.state else {
            panic!("expected merging");
        };
        assert_eq!(session.messages.len(), 3);
        assert_eq!(session.messages.last(), Some(&r));
        assert_eq!(session.last_updated, r.created_at);
        assert!(session.records_turn(ctx.turn_id(), ctx.user_message.id));

        let step = step.state.apply(&ctx, TurnEvent::Checkpointed).unwrap();
        assert_eq!(step.effect, Effect::Deliver);
        match step.state {
            TurnState::Persisted { reply, replayed, .. } => {
                assert_eq!(reply, r);
                assert!(!replayed);
            }
            other => panic!("expected persisted, got {:?}", other.phase()),
        }
    }

    #[test]
    fn test_loaded_inbound_is_kept_in_place() {
        let ctx = ctx();
        let earlier = ChatMessage::user("t-1", Uuid::now_v7(), "hi");
        let loaded = vec![earlier.clone(), ctx.user_message.clone()];
        let step = TurnState::Loading
            .apply(&ctx, TurnEvent::Loaded { history: loaded })
            .unwrap();
        let TurnState::Windowing { history } = step.state else {
            panic!("expected windowing");
        };
        let ids: Vec<_> = history.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![earlier.id, ctx.user_message.id]);
    }

    #[test]
    fn test_superseded_inbound_fails_without_reordering() {
        let mut ctx = ctx();
        ctx.user_message.seq = Some(1);
        let mut later = ChatMessage::user("t-1", Uuid::now_v7(), "second");
        later.seq = Some(2);
        let loaded = vec![ctx.user_message.clone(), later];

        let step = TurnState::Loading
            .apply(&ctx, TurnEvent::Loaded { history: loaded })
            .unwrap();

        assert_eq!(step.effect, Effect::Abort);
        assert!(matches!(
            step.state,
            TurnState::Failed { error: TurnError::Stale(id) } if id == ctx.turn_id()
        ));
    }

    #[test]
    fn test_inbound_older_than_loaded_slice_is_superseded() {
        // The inbound message fell outside the retrieval cap.
        let mut ctx = ctx();
        ctx.user_message.seq = Some(3);
        let mut newer = ChatMessage::user("t-1", Uuid::now_v7(), "newer");
        newer.seq = Some(9);

        let step = TurnState::Loading
            .apply(&ctx, TurnEvent::Loaded { history: vec![newer] })
            .unwrap();

        assert_eq!(step.state.phase(), TurnPhase::Failed);
    }

    #[test]
    fn test_replay_goes_straight_to_persisted() {
        let ctx = ctx();
        let r = reply(&ctx);
        let session = SessionState {
            thread_id: ctx.thread_id.clone(),
            messages: vec![ctx.user_message.clone(), r.clone()],
            language: "english".into(),
            last_updated: r.created_at,
            last_turn: Some(TurnReceipt {
                turn_id: ctx.turn_id(),
                user_message_id: ctx.user_message.id,
                reply: r.clone(),
            }),
        };
        let step = TurnState::Loading
            .apply(&ctx, TurnEvent::Replayed { session })
            .unwrap();
        assert_eq!(step.effect, Effect::Deliver);
        assert!(matches!(
            step.state,
            TurnState::Persisted { replayed: true, ref reply, .. } if *reply == r
        ));
    }

    #[test]
    fn test_replay_without_receipt_is_rejected() {
        let ctx = ctx();
        let session = SessionState {
            thread_id: ctx.thread_id.clone(),
            messages: vec![],
            language: "english".into(),
            last_updated: chrono::Utc::now(),
            last_turn: None,
        };
        let err = TurnState::Loading
            .apply(&ctx, TurnEvent::Replayed { session })
            .unwrap_err();
        assert_eq!(err.from, TurnPhase::Loading);
    }

    #[test]
    fn test_failure_from_every_non_terminal_state() {
        let ctx = ctx();
        let states = vec![
            TurnState::Loading,
            TurnState::Windowing { history: vec![] },
            TurnState::Generating {
                history: vec![],
                window: Window {
                    messages: vec![],
                    token_count: 10,
                    over_budget: Some(OverBudget::UserFloor),
                },
            },
        ];
        for state in states {
            let step = state
                .apply(&ctx, TurnEvent::Failed(CompletionError::Cancelled.into()))
                .unwrap();
            assert_eq!(step.effect, Effect::Abort);
            assert!(step.state.is_terminal());
            assert_eq!(step.state.phase(), TurnPhase::Failed);
        }

        let r = reply(&ctx);
        let merging = TurnState::Loading
            .apply(&ctx, TurnEvent::Loaded { history: vec![] })
            .and_then(|s| s.state.apply(&ctx, TurnEvent::Windowed(window(vec![]))))
            .and_then(|s| s.state.apply(&ctx, TurnEvent::Generated(r)))
            .unwrap();
        let step = merging
            .state
            .apply(&ctx, TurnEvent::Failed(RepositoryError::Connection.into()))
            .unwrap();
        assert!(matches!(step.state, TurnState::Failed { error: TurnError::Store(_) }));
    }

    #[test]
    fn test_terminal_states_reject_events() {
        let ctx = ctx();
        let failed = TurnState::Failed {
            error: CompletionError::Timeout(1).into(),
        };
        let err = failed
            .apply(&ctx, TurnEvent::Failed(CompletionError::Cancelled.into()))
            .unwrap_err();
        assert_eq!(err.from, TurnPhase::Failed);
        assert_eq!(err.event, "failed");
    }

    #[test]
    fn test_out_of_order_event_is_rejected() {
        let ctx = ctx();
        let err = TurnState::Loading
            .apply(&ctx, TurnEvent::Checkpointed)
            .unwrap_err();
        assert_eq!(err.to_string(), "no transition from loading on 'checkpointed'");

        let err = TurnState::Windowing { history: vec![] }
            .apply(&ctx, TurnEvent::Generated(reply(&ctx)))
            .unwrap_err();
        assert_eq!(err.from, TurnPhase::Windowing);
    }
}
