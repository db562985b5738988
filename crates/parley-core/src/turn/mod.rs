//! One conversational turn: load, window, generate, merge, persist.
//!
//! - `state`: the pure transition function of the turn state machine
//! - `orchestrator`: drives the machine against the stores and the backend
//! - `lock`: per-thread mutual exclusion

pub mod lock;
pub mod orchestrator;
pub mod state;

pub use lock::ThreadLocks;
pub use orchestrator::{TurnOrchestrator, TurnOutcome, TurnSettings};
pub use state::{Effect, Step, TurnContext, TurnEvent, TurnPhase, TurnState};
