//! Async access to the local store.
//!
//! The session layer talks to persistence through [`ChatStore`]; every call is
//! a suspension point. [`SqliteStore`] runs the synchronous [`Database`]
//! operations on tokio's blocking pool.

use std::sync::Arc;

use async_trait::async_trait;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::{Chat, ChatWithMessages, Message, NewMessage};

/// Transactional chat/message storage.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// A chat joined with its messages, or `None` if it does not exist.
    async fn get_chat(&self, chat_id: i64) -> Result<Option<ChatWithMessages>>;

    /// All chats owned by `user_email`, unordered.
    async fn get_chats(&self, user_email: &str) -> Result<Vec<Chat>>;

    /// Insert a chat and its seed messages atomically; returns the new id.
    async fn create_chat(
        &self,
        user_email: &str,
        name: &str,
        initial_messages: Vec<NewMessage>,
    ) -> Result<i64>;

    /// All messages of a chat in insertion order.
    async fn get_messages(&self, chat_id: i64) -> Result<Vec<Message>>;

    /// Append a message and bump the chat timestamp; `None` if the chat is missing.
    async fn add_message(&self, chat_id: i64, message: NewMessage) -> Result<Option<Message>>;

    /// Replace a chat's messages and bump its timestamp; no-op if the chat is missing.
    async fn update_chat_messages(&self, chat_id: i64, messages: Vec<NewMessage>) -> Result<()>;

    /// Delete a chat with its messages; idempotent.
    async fn delete_chat(&self, chat_id: i64) -> Result<()>;

    /// The `limit` most recently active chats of a user with their messages.
    async fn get_recent_chats_with_messages(
        &self,
        user_email: &str,
        limit: usize,
    ) -> Result<Vec<ChatWithMessages>>;
}

/// [`ChatStore`] backed by the SQLite [`Database`].
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db: Arc::new(db) }
    }

    /// The underlying database, for synchronous callers and tests
    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| Error::Task(e.to_string()))?
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn get_chat(&self, chat_id: i64) -> Result<Option<ChatWithMessages>> {
        self.run(move |db| db.get_chat(chat_id)).await
    }

    async fn get_chats(&self, user_email: &str) -> Result<Vec<Chat>> {
        let user_email = user_email.to_string();
        self.run(move |db| db.get_chats(&user_email)).await
    }

    async fn create_chat(
        &self,
        user_email: &str,
        name: &str,
        initial_messages: Vec<NewMessage>,
    ) -> Result<i64> {
        let user_email = user_email.to_string();
        let name = name.to_string();
        self.run(move |db| db.create_chat(&user_email, &name, &initial_messages))
            .await
    }

    async fn get_messages(&self, chat_id: i64) -> Result<Vec<Message>> {
        self.run(move |db| db.get_messages(chat_id)).await
    }

    async fn add_message(&self, chat_id: i64, message: NewMessage) -> Result<Option<Message>> {
        self.run(move |db| db.add_message(chat_id, &message)).await
    }

    async fn update_chat_messages(&self, chat_id: i64, messages: Vec<NewMessage>) -> Result<()> {
        self.run(move |db| db.update_chat_messages(chat_id, &messages))
            .await
    }

    async fn delete_chat(&self, chat_id: i64) -> Result<()> {
        self.run(move |db| db.delete_chat(chat_id)).await
    }

    async fn get_recent_chats_with_messages(
        &self,
        user_email: &str,
        limit: usize,
    ) -> Result<Vec<ChatWithMessages>> {
        let user_email = user_email.to_string();
        self.run(move |db| db.get_recent_chats_with_messages(&user_email, limit))
            .await
    }
}
