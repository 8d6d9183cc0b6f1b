//! Database repository layer
//!
//! Provides query and insert operations for chats and messages. Every
//! multi-row mutation runs inside a single SQLite transaction.

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Mutex;

/// How many chats [`Database::get_recent_chats_with_messages`] returns by default.
pub const RECENT_CHATS_LIMIT: usize = 3;

/// Database handle (single connection)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    // ============================================
    // Chat operations
    // ============================================

    /// Get a chat joined with all of its messages
    pub fn get_chat(&self, chat_id: i64) -> Result<Option<ChatWithMessages>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let chat = tx
            .query_row(
                "SELECT * FROM chats WHERE id = ?",
                [chat_id],
                Self::row_to_chat,
            )
            .optional()?;

        let result = match chat {
            Some(chat) => {
                let messages = Self::query_messages(&tx, chat_id)?;
                Some(ChatWithMessages { chat, messages })
            }
            None => None,
        };

        tx.commit()?;
        Ok(result)
    }

    /// Get all chats owned by a user (unordered)
    pub fn get_chats(&self, user_email: &str) -> Result<Vec<Chat>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM chats WHERE user_email = ?")?;

        let chats = stmt
            .query_map([user_email], Self::row_to_chat)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(chats)
    }

    /// Create a chat seeded with `initial_messages`, all or nothing
    ///
    /// Returns the new chat's identifier.
    pub fn create_chat(
        &self,
        user_email: &str,
        name: &str,
        initial_messages: &[NewMessage],
    ) -> Result<i64> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO chats (user_email, name, timestamp) VALUES (?1, ?2, ?3)",
            params![user_email, name, format_timestamp(Utc::now())],
        )?;
        let chat_id = tx.last_insert_rowid();

        for message in initial_messages {
            Self::insert_message(&tx, chat_id, message)?;
        }

        tx.commit()?;

        tracing::debug!(
            chat_id,
            seeded = initial_messages.len(),
            "Created chat"
        );
        Ok(chat_id)
    }

    /// Get the most recently active chats of a user with their messages
    pub fn get_recent_chats_with_messages(
        &self,
        user_email: &str,
        limit: usize,
    ) -> Result<Vec<ChatWithMessages>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let chats = {
            let mut stmt = tx.prepare(
                "SELECT * FROM chats WHERE user_email = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
            )?;
            let rows = stmt
                .query_map(params![user_email, limit as i64], Self::row_to_chat)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        let mut result = Vec::with_capacity(chats.len());
        for chat in chats {
            let messages = Self::query_messages(&tx, chat.id)?;
            result.push(ChatWithMessages { chat, messages });
        }

        tx.commit()?;
        Ok(result)
    }

    /// Delete a chat and all of its messages
    ///
    /// Deleting a chat that does not exist is not an error.
    pub fn delete_chat(&self, chat_id: i64) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let removed_messages = tx.execute("DELETE FROM messages WHERE chat_id = ?", [chat_id])?;
        let removed_chats = tx.execute("DELETE FROM chats WHERE id = ?", [chat_id])?;

        tx.commit()?;

        tracing::debug!(
            chat_id,
            removed_chats,
            removed_messages,
            "Deleted chat"
        );
        Ok(())
    }

    fn row_to_chat(row: &Row) -> rusqlite::Result<Chat> {
        let timestamp_str: String = row.get("timestamp")?;

        Ok(Chat {
            id: row.get("id")?,
            user_email: row.get("user_email")?,
            name: row.get("name")?,
            timestamp: parse_timestamp(&timestamp_str).unwrap_or_default(),
        })
    }

    /// Read a chat's current timestamp, or `None` if the chat does not exist
    fn chat_timestamp(conn: &Connection, chat_id: i64) -> Result<Option<DateTime<Utc>>> {
        let ts: Option<String> = conn
            .query_row("SELECT timestamp FROM chats WHERE id = ?", [chat_id], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(ts.map(|s| parse_timestamp(&s).unwrap_or_default()))
    }

    /// Bump a chat's timestamp without ever moving it backwards
    fn touch_chat(conn: &Connection, chat_id: i64, previous: DateTime<Utc>) -> Result<()> {
        let now = Utc::now();
        let next = if now > previous { now } else { previous };
        conn.execute(
            "UPDATE chats SET timestamp = ?1 WHERE id = ?2",
            params![format_timestamp(next), chat_id],
        )?;
        Ok(())
    }

    // ============================================
    // Message operations
    // ============================================

    /// Get all messages of a chat in insertion order
    pub fn get_messages(&self, chat_id: i64) -> Result<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        Self::query_messages(&conn, chat_id)
    }

    /// Count messages of a chat
    pub fn count_messages(&self, chat_id: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE chat_id = ?",
            [chat_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// Append a message to a chat and bump the chat's timestamp
    ///
    /// Returns `None` when the chat does not exist; nothing is written then.
    pub fn add_message(&self, chat_id: i64, message: &NewMessage) -> Result<Option<Message>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let Some(previous) = Self::chat_timestamp(&tx, chat_id)? else {
            tracing::error!(chat_id, "Chat not found, aborting message insert");
            tx.rollback()?;
            return Ok(None);
        };

        let id = Self::insert_message(&tx, chat_id, message)?;
        Self::touch_chat(&tx, chat_id, previous)?;

        tx.commit()?;

        Ok(Some(Message {
            id,
            chat_id,
            role: message.role,
            content: message.content.clone(),
        }))
    }

    /// Replace the full message set of a chat and bump its timestamp
    ///
    /// Logs a warning and writes nothing when the chat does not exist.
    pub fn update_chat_messages(&self, chat_id: i64, messages: &[NewMessage]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let Some(previous) = Self::chat_timestamp(&tx, chat_id)? else {
            tracing::warn!(
                chat_id,
                "Attempted to update messages for non-existent chat"
            );
            tx.rollback()?;
            return Ok(());
        };

        tx.execute("DELETE FROM messages WHERE chat_id = ?", [chat_id])?;
        for message in messages {
            Self::insert_message(&tx, chat_id, message)?;
        }
        Self::touch_chat(&tx, chat_id, previous)?;

        tx.commit()?;
        Ok(())
    }

    fn insert_message(conn: &Connection, chat_id: i64, message: &NewMessage) -> Result<i64> {
        conn.execute(
            "INSERT INTO messages (chat_id, role, content) VALUES (?1, ?2, ?3)",
            params![chat_id, message.role.as_str(), message.content],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn query_messages(conn: &Connection, chat_id: i64) -> Result<Vec<Message>> {
        let mut stmt = conn.prepare("SELECT * FROM messages WHERE chat_id = ? ORDER BY id ASC")?;

        let messages = stmt
            .query_map([chat_id], Self::row_to_message)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)?;

        Ok(messages)
    }

    fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
        let role_str: String = row.get("role")?;

        Ok(Message {
            id: row.get("id")?,
            chat_id: row.get("chat_id")?,
            // The CHECK constraint keeps unknown roles out of the table
            role: role_str.parse().unwrap_or(Role::User),
            content: row.get("content")?,
        })
    }
}
