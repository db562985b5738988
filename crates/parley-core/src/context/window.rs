//! Context window selection.
//!
//! Chooses which trailing part of a thread's history is sent to the model.
//! The scan runs newest to oldest and stops at the first message that would
//! push the running total over budget, so the result is always a contiguous
//! suffix of the body. Messages are never split.
//!
//! Two cases may exceed the budget, and both are reported on the result:
//! a retained leading system message that alone exceeds it, and the user
//! floor (the most recent user message kept when no user turn fits, unless
//! a retained system message already uses the whole budget).

use parley_types::chat::ChatMessage;
use parley_types::error::TokenizationError;

use crate::llm::token::TokenCounter;

/// Budget and system-message policy for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub max_tokens: u32,
    /// Always keep `history[0]` when it is a system message.
    pub include_system: bool,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            include_system: true,
        }
    }
}

/// Why a window's token count exceeds its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverBudget {
    /// The retained system message alone exceeds the budget.
    SystemRetained,
    /// No user message fit, so the most recent one was kept regardless.
    UserFloor,
}

/// The messages selected for one completion call, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub messages: Vec<ChatMessage>,
    pub token_count: u32,
    pub over_budget: Option<OverBudget>,
}

impl Window {
    fn empty() -> Self {
        Self {
            messages: Vec::new(),
            token_count: 0,
            over_budget: None,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Select a budget-respecting window from `history` (oldest first).
///
/// The first non-system message of the result is always a user message.
/// A history holding at least one user message never yields an empty window.
pub fn build_window<C: TokenCounter + ?Sized>(
    history: &[ChatMessage],
    policy: &WindowPolicy,
    counter: &C,
) -> Result<Window, TokenizationError> {
    let Some(first) = history.first() else {
        return Ok(Window::empty());
    };

    let (system, body) = if policy.include_system && first.is_system() {
        (Some(first), &history[1..])
    } else {
        (None, history)
    };

    let system_tokens = match system {
        Some(message) => counter.count_tokens(message)?,
        None => 0,
    };
    let body_budget = policy.max_tokens.saturating_sub(system_tokens);

    // Newest to oldest; `counts[i]` belongs to `body[start + i]`.
    let mut start = body.len();
    let mut counts = Vec::new();
    let mut body_tokens: u32 = 0;
    for message in body.iter().rev() {
        let tokens = counter.count_tokens(message)?;
        match body_tokens.checked_add(tokens) {
            Some(total) if total <= body_budget => {
                body_tokens = total;
                counts.push(tokens);
                start -= 1;
            }
            _ => break,
        }
    }
    counts.reverse();

    // Anchor: drop leading messages until the body starts on a user turn.
    let mut kept = &body[start..];
    let mut kept_counts = &counts[..];
    while let Some(message) = kept.first() {
        if message.is_user() {
            break;
        }
        body_tokens -= kept_counts[0];
        kept = &kept[1..];
        kept_counts = &kept_counts[1..];
    }

    let mut messages = Vec::with_capacity(kept.len() + 1);
    if let Some(message) = system {
        messages.push(message.clone());
    }

    // A retained system message that alone exhausts the budget leaves no
    // room for the floor.
    let system_exhausts = system.is_some() && system_tokens >= policy.max_tokens;
    if kept.is_empty() && !system_exhausts {
        if let Some(floor) = body.iter().rev().find(|m| m.is_user()) {
            let tokens = counter.count_tokens(floor)?;
            messages.push(floor.clone());
            let token_count = system_tokens.saturating_add(tokens);
            return Ok(Window {
                messages,
                token_count,
                over_budget: (token_count > policy.max_tokens).then_some(OverBudget::UserFloor),
            });
        }
    }

    messages.extend(kept.iter().cloned());
    let token_count = system_tokens.saturating_add(body_tokens);
    Ok(Window {
        messages,
        token_count,
        over_budget: (system_tokens > policy.max_tokens).then_some(OverBudget::SystemRetained),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::chat::MessageRole;
    use uuid::Uuid;

    /// Every message costs the same number of tokens.
    struct Flat(u32);

    impl TokenCounter for Flat {
        fn count_tokens(&self, message: &ChatMessage) -> Result<u32, TokenizationError> {
            if message.content == "!fail" {
                return Err(TokenizationError {
                    message_id: message.id,
                    reason: "unsupported".into(),
                });
            }
            Ok(self.0)
        }
    }

    /// One token per byte of content.
    struct ByLen;

    impl TokenCounter for ByLen {
        fn count_tokens(&self, message: &ChatMessage) -> Result<u32, TokenizationError> {
            Ok(message.content.len() as u32)
        }
    }

    fn msg(role: MessageRole, content: &str) -> ChatMessage {
        ChatMessage::new("t-1", Uuid::now_v7(), role, content)
    }

    fn sys(content: &str) -> ChatMessage {
        msg(MessageRole::System, content)
    }

    fn user(content: &str) -> ChatMessage {
        msg(MessageRole::User, content)
    }

    fn ai(content: &str) -> ChatMessage {
        msg(MessageRole::Assistant, content)
    }

    fn contents(window: &Window) -> Vec<&str> {
        window.messages.iter().map(|m| m.content.as_str()).collect()
    }

    fn policy(max_tokens: u32) -> WindowPolicy {
        WindowPolicy {
            max_tokens,
            include_system: true,
        }
    }

    fn greeting_history() -> Vec<ChatMessage> {
        vec![sys("sys"), user("hi"), ai("hello"), user("how are you")]
    }

    #[test]
    fn test_everything_fits() {
        let window = build_window(&greeting_history(), &policy(40), &Flat(10)).unwrap();
        assert_eq!(contents(&window), vec!["sys", "hi", "hello", "how are you"]);
        assert_eq!(window.token_count, 40);
        assert!(window.over_budget.is_none());
    }

    #[test]
    fn test_boundary_assistant_is_dropped() {
        // System takes 10, the last two body messages fit in the remaining 20,
        // but the older of them is an assistant turn and cannot lead.
        let window = build_window(&greeting_history(), &policy(30), &Flat(10)).unwrap();
        assert_eq!(contents(&window), vec!["sys", "how are you"]);
        assert_eq!(window.token_count, 20);
    }

    #[test]
    fn test_empty_history_yields_empty_window() {
        let window = build_window(&[], &policy(100), &Flat(1)).unwrap();
        assert!(window.is_empty());
        assert_eq!(window.token_count, 0);
    }

    #[test]
    fn test_zero_budget_keeps_only_system() {
        let window = build_window(&greeting_history(), &policy(0), &Flat(10)).unwrap();
        assert_eq!(contents(&window), vec!["sys"]);
        assert_eq!(window.over_budget, Some(OverBudget::SystemRetained));
    }

    #[test]
    fn test_user_floor_follows_retained_system() {
        let history = vec![sys("s"), user("long question here")];
        let window = build_window(&history, &policy(5), &ByLen).unwrap();
        // 1 token for system, the user message (18) does not fit in 4.
        assert_eq!(contents(&window), vec!["s", "long question here"]);
        assert_eq!(window.token_count, 19);
        assert_eq!(window.over_budget, Some(OverBudget::UserFloor));
    }

    #[test]
    fn test_system_exhausting_budget_leaves_no_floor() {
        let history = vec![sys("sssss"), user("question")];
        let window = build_window(&history, &policy(5), &ByLen).unwrap();
        assert_eq!(contents(&window), vec!["sssss"]);
        assert!(window.over_budget.is_none());
    }

    #[test]
    fn test_user_floor_when_nothing_fits() {
        let history = vec![user("a very long question")];
        let window = build_window(&history, &policy(3), &ByLen).unwrap();
        assert_eq!(contents(&window), vec!["a very long question"]);
        assert_eq!(window.over_budget, Some(OverBudget::UserFloor));
    }

    #[test]
    fn test_user_floor_skips_trailing_assistant() {
        // Scan stops at the assistant message; the floor returns the latest user turn.
        let history = vec![user("q"), ai("a long assistant answer")];
        let window = build_window(&history, &policy(5), &ByLen).unwrap();
        assert_eq!(contents(&window), vec!["q"]);
        assert!(window.over_budget.is_none());
    }

    #[test]
    fn test_system_not_retained_when_disabled() {
        let history = greeting_history();
        let no_system = WindowPolicy {
            max_tokens: 30,
            include_system: false,
        };
        let window = build_window(&history, &no_system, &Flat(10)).unwrap();
        assert_eq!(contents(&window), vec!["hi", "hello", "how are you"]);
    }

    #[test]
    fn test_history_without_user_messages() {
        let history = vec![ai("one"), ai("two")];
        let window = build_window(&history, &policy(100), &Flat(1)).unwrap();
        assert!(window.is_empty());
    }

    #[test]
    fn test_tokenization_failure_fails_window() {
        let history = vec![user("fine"), user("!fail")];
        let err = build_window(&history, &policy(100), &Flat(1)).unwrap_err();
        assert_eq!(err.message_id, history[1].id);
    }

    #[test]
    fn test_messages_are_never_split() {
        let history = vec![user("aaaa"), ai("bbbb"), user("cccc")];
        // 10 tokens: "cccc" and "bbbb" fit (8), "aaaa" would make 12.
        let window = build_window(&history, &policy(10), &ByLen).unwrap();
        assert_eq!(contents(&window), vec!["cccc"]);
        assert_eq!(window.token_count, 4);
    }

    #[test]
    fn test_budget_respected_over_long_history() {
        let mut history = vec![sys("system prompt")];
        for i in 0..50 {
            history.push(user(&format!("question number {i}")));
            history.push(ai(&format!("answer number {i} with some detail")));
        }
        history.push(user("latest question"));
        for budget in [20, 57, 120, 400, 1000] {
            let window = build_window(&history, &policy(budget), &ByLen).unwrap();
            match window.over_budget {
                Some(OverBudget::UserFloor) => assert_eq!(window.len(), 2, "budget {budget}"),
                other => {
                    assert!(other.is_none(), "budget {budget}");
                    assert!(window.token_count <= budget, "budget {budget}");
                }
            }
            assert!(window.messages[0].is_system());
            if let Some(first_body) = window.messages.get(1) {
                assert!(first_body.is_user(), "budget {budget}");
            }
            // Suffix: the body is the tail of the history, in order.
            let body = &window.messages[1..];
            let tail = &history[history.len() - body.len()..];
            assert_eq!(body, tail);
        }
    }
}
