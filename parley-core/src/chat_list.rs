//! Chat list manager
//!
//! Keeps the sorted view of one user's chats and mediates create, select and
//! delete. Store failures are logged and degrade to an empty list or an
//! unchanged state; they are never returned to the caller.

use std::sync::{Arc, Mutex};

use crate::dialogs::Dialogs;
use crate::format::default_chat_name;
use crate::store::ChatStore;
use crate::types::Chat;

/// Loading state of the chat list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListState {
    NotLoaded,
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug)]
struct ListView {
    chats: Vec<Chat>,
    state: ListState,
    current_chat_id: Option<i64>,
    load_generation: u64,
}

/// Sorted, selectable list of a user's chats.
pub struct ChatListManager {
    user_email: String,
    store: Arc<dyn ChatStore>,
    view: Mutex<ListView>,
}

impl ChatListManager {
    pub fn new(user_email: impl Into<String>, store: Arc<dyn ChatStore>) -> Self {
        Self {
            user_email: user_email.into(),
            store,
            view: Mutex::new(ListView {
                chats: Vec::new(),
                state: ListState::NotLoaded,
                current_chat_id: None,
                load_generation: 0,
            }),
        }
    }

    pub fn user_email(&self) -> &str {
        &self.user_email
    }

    /// Reload the list from the store, most recently active first.
    pub async fn load(&self) -> Vec<Chat> {
        let generation = {
            let mut view = self.view.lock().unwrap();
            view.state = ListState::Loading;
            view.load_generation += 1;
            view.load_generation
        };

        let result = self.store.get_chats(&self.user_email).await;

        let mut view = self.view.lock().unwrap();
        if view.load_generation != generation {
            tracing::debug!(generation, "Discarding superseded chat list load");
            return view.chats.clone();
        }

        match result {
            Ok(mut chats) => {
                sort_chats(&mut chats);
                tracing::debug!(count = chats.len(), "Loaded chats");
                view.chats = chats;
                view.state = ListState::Loaded;
            }
            Err(e) => {
                tracing::error!(error = %e, user_email = %self.user_email, "Failed to load chats");
                view.chats.clear();
                view.state = ListState::Failed;
            }
        }
        view.chats.clone()
    }

    /// Create a chat named `name` and select it.
    ///
    /// Declines (returns `None`) when no usable name is given.
    pub async fn create(&self, name: Option<&str>) -> Option<i64> {
        let name = match name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                tracing::debug!("Chat creation declined: no name");
                return None;
            }
        };

        let previous_state = self.enter_loading();

        match self
            .store
            .create_chat(&self.user_email, &name, Vec::new())
            .await
        {
            Ok(chat_id) => {
                tracing::info!(chat_id, name = %name, "Created chat");
                self.load().await;
                self.select(Some(chat_id));
                Some(chat_id)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to create chat");
                self.leave_loading(previous_state);
                None
            }
        }
    }

    /// Ask the user for a name, then [`create`](Self::create).
    pub async fn create_with_prompt(&self, dialogs: &dyn Dialogs) -> Option<i64> {
        let name = dialogs.prompt_text("Enter a name for the new chat:", &default_chat_name());
        self.create(name.as_deref()).await
    }

    /// Delete a listed chat after the user confirms.
    ///
    /// Returns whether the chat was deleted.
    pub async fn delete(&self, chat_id: i64, dialogs: &dyn Dialogs) -> bool {
        let Some(chat) = self.find(chat_id) else {
            tracing::debug!(chat_id, "Delete ignored: chat not in list");
            return false;
        };

        let question = format!(
            "Are you sure you want to delete chat \"{}\"? This cannot be undone.",
            chat.name
        );
        if !dialogs.confirm(&question) {
            return false;
        }

        let previous_state = self.enter_loading();

        match self.store.delete_chat(chat_id).await {
            Ok(()) => {
                {
                    let mut view = self.view.lock().unwrap();
                    if view.current_chat_id == Some(chat_id) {
                        view.current_chat_id = None;
                    }
                }
                tracing::info!(chat_id, "Deleted chat");
                self.load().await;
                true
            }
            Err(e) => {
                tracing::error!(error = %e, chat_id, "Failed to delete chat");
                self.leave_loading(previous_state);
                false
            }
        }
    }

    /// Set or clear the active chat; returns whether the selection changed.
    pub fn select(&self, chat_id: Option<i64>) -> bool {
        let mut view = self.view.lock().unwrap();
        if view.current_chat_id == chat_id {
            return false;
        }
        view.current_chat_id = chat_id;
        true
    }

    pub fn chats(&self) -> Vec<Chat> {
        self.view.lock().unwrap().chats.clone()
    }

    pub fn find(&self, chat_id: i64) -> Option<Chat> {
        self.view
            .lock()
            .unwrap()
            .chats
            .iter()
            .find(|c| c.id == chat_id)
            .cloned()
    }

    pub fn state(&self) -> ListState {
        self.view.lock().unwrap().state
    }

    pub fn is_loading(&self) -> bool {
        self.state() == ListState::Loading
    }

    pub fn current_chat_id(&self) -> Option<i64> {
        self.view.lock().unwrap().current_chat_id
    }

    fn enter_loading(&self) -> ListState {
        let mut view = self.view.lock().unwrap();
        std::mem::replace(&mut view.state, ListState::Loading)
    }

    fn leave_loading(&self, previous: ListState) {
        let mut view = self.view.lock().unwrap();
        if view.state == ListState::Loading {
            view.state = match previous {
                ListState::Loading => ListState::Loaded,
                other => other,
            };
        }
    }
}

/// Most recently active first; ties broken by newest id.
pub fn sort_chats(chats: &mut [Chat]) {
    chats.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.id.cmp(&a.id))
    });
}
