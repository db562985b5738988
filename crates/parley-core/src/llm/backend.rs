//! CompletionBackend trait definition.

use parley_types::chat::ChatMessage;
use parley_types::error::CompletionError;
use parley_types::llm::StopReason;

use super::token::TokenCounter;

/// A generated reply and its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub content: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub stop_reason: StopReason,
}

/// Stateless prompt -> reply function used by the GENERATING step of a turn.
///
/// The backend also provides the token counter the window builder uses, so
/// both see the same notion of message size. Implementations must not keep
/// per-thread state: everything a call needs is in its arguments.
pub trait CompletionBackend: TokenCounter {
    fn generate(
        &self,
        system_instruction: &str,
        messages: &[ChatMessage],
    ) -> impl std::future::Future<Output = Result<Generation, CompletionError>> + Send;
}
