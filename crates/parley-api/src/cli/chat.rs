//! `parley chat`: run a single turn from the terminal.

use anyhow::Result;
use console::style;
use tokio_util::sync::CancellationToken;

use parley_types::chat::{MessageRole, MessageView, TurnRequest};

use crate::state::AppState;

/// Run one turn and print the returned history.
///
/// Ctrl+C cancels the turn; the user message stays persisted and the same
/// command can be rerun.
pub async fn run_chat(
    state: &AppState,
    user: String,
    thread: String,
    language: Option<String>,
    text: String,
    json: bool,
) -> Result<()> {
    let request = TurnRequest {
        user_id: user,
        thread_id: thread,
        text,
        turn_id: None,
        language,
    };

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = state.chat_service.run_turn(request, cancel).await;
    watcher.abort();
    let response = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!();
    for message in &response.messages {
        print_message(message);
    }
    println!();
    Ok(())
}

pub(crate) fn print_message(message: &MessageView) {
    let time = message.timestamp.format("%H:%M:%S");
    let label = match message.role {
        MessageRole::User => style("you").green().bold(),
        MessageRole::Assistant => style("ai").cyan().bold(),
        MessageRole::System => style("system").dim(),
    };
    println!("  {} {} {}", style(time).dim(), label, message.content);
}
