//! Chat session
//!
//! One logged-in user's view of the app: the chat list, the open chat's
//! message pipeline, and the address of what is open. Selecting a chat in the
//! list switches the pipeline to it.

use std::sync::Arc;

use crate::chat_list::ChatListManager;
use crate::completion::CompletionGateway;
use crate::config::AuthConfig;
use crate::dialogs::Dialogs;
use crate::error::Result;
use crate::identity::{authenticate, IdentityProvider};
use crate::pipeline::{MessagePipeline, SendOutcome};
use crate::store::ChatStore;
use crate::types::{Chat, ChatWithMessages};

const CHAT_PATH_PREFIX: &str = "/chats/";

/// Session state for one authenticated user.
pub struct ChatSession {
    store: Arc<dyn ChatStore>,
    list: ChatListManager,
    pipeline: MessagePipeline,
}

impl ChatSession {
    /// Open a session for the current identity.
    ///
    /// Fails with [`Error::NotAuthenticated`](crate::Error::NotAuthenticated)
    /// when nobody is logged in or the identity is not allowed.
    pub fn new(
        identity: &dyn IdentityProvider,
        store: Arc<dyn ChatStore>,
        gateway: Arc<dyn CompletionGateway>,
        auth: &AuthConfig,
    ) -> Result<Self> {
        let user_email = authenticate(identity, auth)?;
        tracing::info!(user_email = %user_email, "Session opened");

        Ok(Self {
            list: ChatListManager::new(user_email, Arc::clone(&store)),
            pipeline: MessagePipeline::new(Arc::clone(&store), gateway),
            store,
        })
    }

    /// Initial load of the chat list.
    pub async fn start(&self) -> Vec<Chat> {
        self.list.load().await
    }

    /// Select a chat (or nothing) and load its messages if the selection changed.
    pub async fn select(&self, chat_id: Option<i64>) {
        if self.list.select(chat_id) {
            self.pipeline.open_chat(chat_id).await;
        }
    }

    /// Create a chat, select it and open it.
    pub async fn create(&self, name: Option<&str>) -> Option<i64> {
        let chat_id = self.list.create(name).await?;
        self.pipeline.open_chat(Some(chat_id)).await;
        Some(chat_id)
    }

    pub async fn create_with_prompt(&self, dialogs: &dyn Dialogs) -> Option<i64> {
        let chat_id = self.list.create_with_prompt(dialogs).await?;
        self.pipeline.open_chat(Some(chat_id)).await;
        Some(chat_id)
    }

    /// Delete a chat after confirmation; closes it if it was open.
    pub async fn delete(&self, chat_id: i64, dialogs: &dyn Dialogs) -> bool {
        let deleted = self.list.delete(chat_id, dialogs).await;
        if deleted && self.pipeline.chat_id() == Some(chat_id) {
            self.pipeline.open_chat(None).await;
        }
        deleted
    }

    pub async fn send(&self, content: &str) -> SendOutcome {
        let outcome = self.pipeline.send(content).await;
        self.refresh_after_send(&outcome).await;
        outcome
    }

    pub async fn submit(&self) -> SendOutcome {
        let outcome = self.pipeline.submit().await;
        self.refresh_after_send(&outcome).await;
        outcome
    }

    /// Sends bump the chat timestamp, so the list order may have changed.
    async fn refresh_after_send(&self, outcome: &SendOutcome) {
        if !matches!(outcome, SendOutcome::Skipped(_)) {
            self.list.load().await;
        }
    }

    /// The most recently active chats with their messages.
    pub async fn recent_chats(&self, limit: usize) -> Result<Vec<ChatWithMessages>> {
        self.store
            .get_recent_chats_with_messages(self.list.user_email(), limit)
            .await
    }

    // ============================================
    // Addressing
    // ============================================

    /// Address of what is open: `/chats/{id}` or `/`.
    pub fn location(&self) -> String {
        match self.list.current_chat_id() {
            Some(chat_id) => format!("{}{}", CHAT_PATH_PREFIX, chat_id),
            None => "/".to_string(),
        }
    }

    /// Open whatever `location` addresses; `/` closes the open chat.
    ///
    /// Returns false for an unrecognized address.
    pub async fn open_location(&self, location: &str) -> bool {
        if location.trim() == "/" {
            self.select(None).await;
            return true;
        }
        match parse_location(location) {
            Some(chat_id) => {
                self.select(Some(chat_id)).await;
                true
            }
            None => {
                tracing::debug!(location, "Unrecognized location");
                false
            }
        }
    }

    // ============================================
    // Accessors
    // ============================================

    pub fn chats(&self) -> Vec<Chat> {
        self.list.chats()
    }

    pub fn list(&self) -> &ChatListManager {
        &self.list
    }

    pub fn pipeline(&self) -> &MessagePipeline {
        &self.pipeline
    }

    pub fn user_email(&self) -> &str {
        self.list.user_email()
    }
}

/// Chat id addressed by `/chats/{id}`.
pub fn parse_location(location: &str) -> Option<i64> {
    location
        .trim()
        .strip_prefix(CHAT_PATH_PREFIX)?
        .trim_end_matches('/')
        .parse()
        .ok()
}
