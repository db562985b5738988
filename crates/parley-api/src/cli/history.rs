//! `parley history`: show a thread's recent messages.

use anyhow::Result;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;

use parley_types::chat::{MessageRole, MessageView};

use crate::state::AppState;

/// Print the newest `limit` messages of a thread, oldest first.
pub async fn show_history(state: &AppState, thread_id: &str, limit: usize, json: bool) -> Result<()> {
    let messages = state.chat_service.history(thread_id, limit.max(1)).await?;
    let views: Vec<MessageView> = messages.iter().map(MessageView::from).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    if views.is_empty() {
        println!();
        println!(
            "  {} No messages in thread '{}'.",
            style("i").blue().bold(),
            style(thread_id).cyan()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Time").fg(Color::White),
        Cell::new("Role").fg(Color::White),
        Cell::new("Message").fg(Color::White),
    ]);

    for (view, message) in views.iter().zip(&messages) {
        let role_cell = match view.role {
            MessageRole::User => Cell::new("user").fg(Color::Green),
            MessageRole::Assistant => Cell::new("assistant").fg(Color::Cyan),
            MessageRole::System => Cell::new("system").fg(Color::DarkGrey),
        };
        let content = match message.model.as_deref() {
            Some(model) => format!("{}\n({model})", view.content),
            None => view.content.clone(),
        };
        table.add_row(vec![
            Cell::new(view.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()).fg(Color::DarkGrey),
            role_cell,
            Cell::new(content),
        ]);
    }

    println!();
    println!("  Thread '{}'", style(thread_id).cyan().bold());
    println!("{table}");
    println!();
    Ok(())
}
