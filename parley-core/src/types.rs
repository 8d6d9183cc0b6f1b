//! Core domain types for parley
//!
//! | Term | Definition |
//! |------|------------|
//! | **Chat** | A named, timestamped conversation thread owned by one user identity |
//! | **Message** | One turn in a chat, authored by the user or the assistant |
//! | **CompletionMessage** | The `{role, content}` shape exchanged with the completion endpoint |
//!
//! Records carrying an `id` have been persisted by the local store. Writes go
//! through [`NewMessage`], which has no identity of its own.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Role
// ============================================

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Returns the identifier used in database storage and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

// ============================================
// Chat
// ============================================

/// A persisted conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Store-assigned identifier
    pub id: i64,
    /// Owner key
    pub user_email: String,
    /// Display name
    pub name: String,
    /// Last-activity marker, bumped on every message append
    pub timestamp: DateTime<Utc>,
}

/// A chat joined with all of its messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatWithMessages {
    #[serde(flatten)]
    pub chat: Chat,
    pub messages: Vec<Message>,
}

// ============================================
// Messages
// ============================================

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned identifier
    pub id: i64,
    /// Owning chat
    pub chat_id: i64,
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Get a preview of the content (first N chars)
    pub fn preview(&self, max_len: usize) -> String {
        let first_line = self.content.lines().next().unwrap_or("");
        if first_line.chars().count() > max_len {
            let truncated: String = first_line.chars().take(max_len).collect();
            format!("{}...", truncated)
        } else {
            first_line.to_string()
        }
    }
}

/// A message that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One entry of the history exchanged with the completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for CompletionMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

// ============================================
// Timestamps
// ============================================

/// Format a timestamp the way it is persisted (`2026-10-16T09:30:00.123Z`).
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a persisted timestamp.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
