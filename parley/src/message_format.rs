//! Shared formatting helpers for terminal output.

use chrono::Local;
use parley_core::format::format_relative_time;
use parley_core::{Chat, ChatWithMessages, DisplayMessage, Role};

/// Role label for a message row.
pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "[you]",
        Role::Assistant => "[assistant]",
    }
}

/// One message of the open chat.
pub fn display_message(msg: &DisplayMessage) -> String {
    let label = if msg.is_notice() {
        "[error]"
    } else {
        role_label(msg.role)
    };
    format!("{} {}", label, msg.content)
}

/// One row of the chat list.
pub fn chat_row(chat: &Chat, selected: bool) -> String {
    let marker = if selected { "*" } else { " " };
    format!(
        "{} {:>4}  {}  ({})",
        marker,
        chat.id,
        chat.name,
        format_relative_time(chat.timestamp)
    )
}

/// Chat heading with its absolute local time.
pub fn chat_heading(chat: &Chat) -> String {
    format!(
        "#{} {} - {}",
        chat.id,
        chat.name,
        chat.timestamp
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
    )
}

/// Heading plus a one-line preview per message.
pub fn recent_chat(entry: &ChatWithMessages, preview_chars: usize) -> String {
    let mut out = chat_heading(&entry.chat);
    if entry.messages.is_empty() {
        out.push_str("\n    (no messages)");
    }
    for msg in &entry.messages {
        out.push_str(&format!(
            "\n    {} {}",
            role_label(msg.role),
            msg.preview(preview_chars)
        ));
    }
    out
}
