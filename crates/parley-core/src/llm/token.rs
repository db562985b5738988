//! Per-message token counting.

use parley_types::chat::ChatMessage;
use parley_types::error::TokenizationError;

/// Counts the tokens a single message contributes to a prompt.
///
/// Counting is synchronous: the window builder calls it once per message
/// while scanning history, and a failure aborts the whole window.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, message: &ChatMessage) -> Result<u32, TokenizationError>;
}

/// Characters of role and framing overhead charged per message.
const MESSAGE_OVERHEAD_CHARS: usize = 10;

/// Character-based estimate: ~4 chars per token plus per-message overhead.
///
/// Matches the estimate the providers report from `count_tokens`, so window
/// decisions agree with what the provider is charged for.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count_tokens(&self, message: &ChatMessage) -> Result<u32, TokenizationError> {
        if message.content.contains('\0') {
            return Err(TokenizationError {
                message_id: message.id,
                reason: "content contains a NUL byte".to_string(),
            });
        }
        let chars = message.content.len() + MESSAGE_OVERHEAD_CHARS;
        Ok(chars.div_ceil(4) as u32)
    }
}
