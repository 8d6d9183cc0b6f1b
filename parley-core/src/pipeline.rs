//! Message pipeline
//!
//! Shows the messages of the open chat and runs the send round-trip:
//!
//! 1. a provisional user message is shown immediately,
//! 2. the message is persisted and the provisional entry is swapped for the
//!    stored one in place,
//! 3. the persisted history goes to the completion gateway,
//! 4. the reply is shown provisionally, persisted, and swapped the same way.
//!
//! On failure a notice is appended and provisional entries are pruned; entries
//! that were already persisted stay. Only one send runs at a time.
//!
//! View state lives behind a mutex that is never held across an await, so
//! concurrent calls on the same pipeline interleave only at store and gateway
//! calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::completion::CompletionGateway;
use crate::error::{Error, Result};
use crate::store::ChatStore;
use crate::types::{CompletionMessage, Message, NewMessage, Role};

/// Source of keys for entries that have no store identity.
static NEXT_LOCAL_KEY: AtomicU64 = AtomicU64::new(1);

fn next_local_key() -> u64 {
    NEXT_LOCAL_KEY.fetch_add(1, Ordering::Relaxed)
}

/// Identity of an entry in the message view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    /// Stored message with its store-assigned id
    Persisted(i64),
    /// Optimistic entry waiting for its store write
    Provisional(u64),
    /// Synthetic entry that is never written (error notices)
    Notice(u64),
}

/// One entry of the message view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMessage {
    pub key: MessageKey,
    pub chat_id: i64,
    pub role: Role,
    pub content: String,
}

impl DisplayMessage {
    fn provisional(chat_id: i64, role: Role, content: &str) -> Self {
        Self {
            key: MessageKey::Provisional(next_local_key()),
            chat_id,
            role,
            content: content.to_string(),
        }
    }

    fn notice(chat_id: i64, content: String) -> Self {
        Self {
            key: MessageKey::Notice(next_local_key()),
            chat_id,
            role: Role::Assistant,
            content,
        }
    }

    /// Store id, if this entry is persisted
    pub fn id(&self) -> Option<i64> {
        match self.key {
            MessageKey::Persisted(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self.key, MessageKey::Provisional(_))
    }

    pub fn is_notice(&self) -> bool {
        matches!(self.key, MessageKey::Notice(_))
    }
}

impl From<Message> for DisplayMessage {
    fn from(message: Message) -> Self {
        Self {
            key: MessageKey::Persisted(message.id),
            chat_id: message.chat_id,
            role: message.role,
            content: message.content,
        }
    }
}

/// Load state of the open chat's messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No chat open
    Idle,
    Loading,
    Ready,
    /// Load failed; the view is empty
    FailedEmpty,
}

/// Why a send did not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoChat,
    EmptyInput,
    AlreadySending,
}

/// How a send settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing happened
    Skipped(SkipReason),
    /// User message and reply are both persisted
    Replied,
    /// User message persisted, the gateway had nothing to say
    NoReply,
    /// Something failed; a notice with this reason was appended
    Failed(String),
}

#[derive(Debug)]
struct PipelineView {
    chat_id: Option<i64>,
    state: PipelineState,
    messages: Vec<DisplayMessage>,
    sending: bool,
    input: String,
    load_generation: u64,
}

/// Message view and send orchestration for the open chat.
pub struct MessagePipeline {
    store: Arc<dyn ChatStore>,
    gateway: Arc<dyn CompletionGateway>,
    view: Mutex<PipelineView>,
}

impl MessagePipeline {
    pub fn new(store: Arc<dyn ChatStore>, gateway: Arc<dyn CompletionGateway>) -> Self {
        Self {
            store,
            gateway,
            view: Mutex::new(PipelineView {
                chat_id: None,
                state: PipelineState::Idle,
                messages: Vec::new(),
                sending: false,
                input: String::new(),
                load_generation: 0,
            }),
        }
    }

    // ============================================
    // Loading
    // ============================================

    /// Switch the view to `chat_id` (or to nothing) and load its messages.
    ///
    /// The previous list is cleared before the load starts. A load that
    /// resolves after another switch is discarded.
    pub async fn open_chat(&self, chat_id: Option<i64>) {
        let generation = {
            let mut view = self.view.lock().unwrap();
            view.chat_id = chat_id;
            view.messages.clear();
            view.load_generation += 1;
            view.state = match chat_id {
                Some(_) => PipelineState::Loading,
                None => PipelineState::Idle,
            };
            view.load_generation
        };

        if let Some(chat_id) = chat_id {
            self.load_messages(chat_id, generation).await;
        }
    }

    /// Reload the open chat's messages from the store.
    pub async fn reload(&self) {
        let chat_id = self.chat_id();
        self.open_chat(chat_id).await;
    }

    async fn load_messages(&self, chat_id: i64, generation: u64) {
        let result = self.store.get_messages(chat_id).await;

        let mut view = self.view.lock().unwrap();
        if view.load_generation != generation || view.chat_id != Some(chat_id) {
            tracing::debug!(chat_id, "Discarding stale message load");
            return;
        }

        match result {
            Ok(messages) => {
                tracing::debug!(chat_id, count = messages.len(), "Loaded messages");
                view.messages = messages.into_iter().map(DisplayMessage::from).collect();
                view.state = PipelineState::Ready;
            }
            Err(e) => {
                tracing::error!(error = %e, chat_id, "Failed to load messages");
                view.messages.clear();
                view.state = PipelineState::FailedEmpty;
            }
        }
    }

    // ============================================
    // Input box
    // ============================================

    pub fn set_input(&self, input: impl Into<String>) {
        self.view.lock().unwrap().input = input.into();
    }

    pub fn input(&self) -> String {
        self.view.lock().unwrap().input.clone()
    }

    /// Send the input box content (the Enter key path).
    ///
    /// A rejected submit leaves the input untouched.
    pub async fn submit(&self) -> SendOutcome {
        let content = {
            let mut view = self.view.lock().unwrap();
            if let Some(reason) = Self::reject(&view, &view.input) {
                return SendOutcome::Skipped(reason);
            }
            std::mem::take(&mut view.input)
        };
        self.send(&content).await
    }

    fn reject(view: &PipelineView, content: &str) -> Option<SkipReason> {
        if view.chat_id.is_none() {
            Some(SkipReason::NoChat)
        } else if content.trim().is_empty() {
            Some(SkipReason::EmptyInput)
        } else if view.sending {
            Some(SkipReason::AlreadySending)
        } else {
            None
        }
    }

    // ============================================
    // Sending
    // ============================================

    /// Send `content` as a user message to the open chat.
    ///
    /// A call while another send is in flight is a no-op.
    pub async fn send(&self, content: &str) -> SendOutcome {
        let (chat_id, user_key) = {
            let mut view = self.view.lock().unwrap();
            if let Some(reason) = Self::reject(&view, content) {
                tracing::debug!(?reason, "Send skipped");
                return SendOutcome::Skipped(reason);
            }
            let Some(chat_id) = view.chat_id else {
                return SendOutcome::Skipped(SkipReason::NoChat);
            };
            view.sending = true;
            let provisional = DisplayMessage::provisional(chat_id, Role::User, content);
            let key = provisional.key;
            view.messages.push(provisional);
            (chat_id, key)
        };

        let outcome = match self.exchange(chat_id, user_key, content).await {
            Ok(true) => SendOutcome::Replied,
            Ok(false) => SendOutcome::NoReply,
            Err(e) => {
                tracing::error!(error = %e, chat_id, "Failed to send message or get completion");
                let reason = e.to_string();
                self.update_chat_view(chat_id, |view| {
                    // One send at a time, so every provisional entry is ours
                    view.messages.retain(|m| !m.is_provisional());
                    view.messages.push(DisplayMessage::notice(
                        chat_id,
                        format!("Error: Could not get response. {}", reason),
                    ));
                });
                SendOutcome::Failed(reason)
            }
        };

        self.view.lock().unwrap().sending = false;
        outcome
    }

    /// Persist the user message, ask the gateway, persist the reply.
    ///
    /// Returns whether a reply was stored.
    async fn exchange(&self, chat_id: i64, user_key: MessageKey, content: &str) -> Result<bool> {
        let saved_user = self
            .store
            .add_message(chat_id, NewMessage::user(content))
            .await?
            .ok_or(Error::ChatNotFound(chat_id))?;

        self.update_chat_view(chat_id, |view| reconcile(view, user_key, &saved_user));

        let history = self.history_for(chat_id, &saved_user).await?;

        let reply = match self.gateway.complete(&history).await? {
            Some(reply) if !reply.content.trim().is_empty() => reply,
            _ => {
                tracing::warn!(chat_id, "Completion endpoint returned no response");
                return Ok(false);
            }
        };

        let provisional = DisplayMessage::provisional(chat_id, Role::Assistant, &reply.content);
        let assistant_key = provisional.key;
        self.update_chat_view(chat_id, |view| view.messages.push(provisional));

        let saved_reply = self
            .store
            .add_message(chat_id, NewMessage::assistant(reply.content))
            .await?
            .ok_or(Error::ChatNotFound(chat_id))?;

        self.update_chat_view(chat_id, |view| reconcile(view, assistant_key, &saved_reply));

        tracing::debug!(
            chat_id,
            user_message_id = saved_user.id,
            reply_message_id = saved_reply.id,
            "Exchange complete"
        );
        Ok(true)
    }

    /// Persisted history ending with `confirmed`.
    ///
    /// Taken from the view when it shows this chat fully loaded, otherwise
    /// read back from the store.
    async fn history_for(&self, chat_id: i64, confirmed: &Message) -> Result<Vec<CompletionMessage>> {
        let from_view = {
            let view = self.view.lock().unwrap();
            if view.chat_id == Some(chat_id) && view.state == PipelineState::Ready {
                let mut history: Vec<CompletionMessage> = view
                    .messages
                    .iter()
                    .filter(|m| m.id().is_some_and(|id| id != confirmed.id))
                    .map(|m| CompletionMessage {
                        role: m.role,
                        content: m.content.clone(),
                    })
                    .collect();
                history.push(CompletionMessage::from(confirmed));
                Some(history)
            } else {
                None
            }
        };

        match from_view {
            Some(history) => Ok(history),
            None => {
                let messages = self.store.get_messages(chat_id).await?;
                Ok(messages.iter().map(CompletionMessage::from).collect())
            }
        }
    }

    /// Apply `f` only while the view still shows `chat_id`.
    fn update_chat_view<F>(&self, chat_id: i64, f: F)
    where
        F: FnOnce(&mut PipelineView),
    {
        let mut view = self.view.lock().unwrap();
        if view.chat_id == Some(chat_id) {
            f(&mut view);
        } else {
            tracing::debug!(chat_id, "View switched away; skipping in-memory update");
        }
    }

    // ============================================
    // Accessors
    // ============================================

    pub fn messages(&self) -> Vec<DisplayMessage> {
        self.view.lock().unwrap().messages.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.view.lock().unwrap().state
    }

    pub fn is_sending(&self) -> bool {
        self.view.lock().unwrap().sending
    }

    pub fn chat_id(&self) -> Option<i64> {
        self.view.lock().unwrap().chat_id
    }
}

/// Swap the provisional entry `key` for the stored `message`, keeping its position.
///
/// If a reload already brought the stored message in, the provisional entry is
/// dropped; if a reload wiped the provisional entry, the stored one is appended.
fn reconcile(view: &mut PipelineView, key: MessageKey, message: &Message) {
    let persisted = MessageKey::Persisted(message.id);
    if view.messages.iter().any(|m| m.key == persisted) {
        view.messages.retain(|m| m.key != key);
        return;
    }

    match view.messages.iter_mut().find(|m| m.key == key) {
        Some(entry) => *entry = DisplayMessage::from(message.clone()),
        None => view.messages.push(DisplayMessage::from(message.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::store::SqliteStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    enum Reply {
        Text(&'static str),
        AsUser(&'static str),
        Empty,
        Fail(&'static str),
    }

    struct MockGateway {
        reply: Reply,
        calls: AtomicUsize,
        histories: Mutex<Vec<Vec<CompletionMessage>>>,
    }

    impl MockGateway {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
                histories: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionGateway for MockGateway {
        async fn complete(
            &self,
            history: &[CompletionMessage],
        ) -> Result<Option<CompletionMessage>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.histories.lock().unwrap().push(history.to_vec());
            match self.reply {
                Reply::Text(text) => Ok(Some(CompletionMessage {
                    role: Role::Assistant,
                    content: text.to_string(),
                })),
                Reply::AsUser(text) => Ok(Some(CompletionMessage {
                    role: Role::User,
                    content: text.to_string(),
                })),
                Reply::Empty => Ok(None),
                Reply::Fail(reason) => Err(Error::Completion(reason.to_string())),
            }
        }
    }

    fn setup(reply: Reply) -> (MessagePipeline, SqliteStore, Arc<MockGateway>, i64) {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let chat_id = db.create_chat("a@x.com", "Test", &[]).unwrap();
        let store = SqliteStore::new(db);
        let gateway = MockGateway::new(reply);
        let pipeline = MessagePipeline::new(Arc::new(store.clone()), gateway.clone());
        (pipeline, store, gateway, chat_id)
    }

    #[test]
    fn test_local_keys_are_unique() {
        let a = DisplayMessage::provisional(1, Role::User, "a");
        let b = DisplayMessage::provisional(1, Role::User, "a");
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn test_reconcile_preserves_position() {
        let mut view = PipelineView {
            chat_id: Some(1),
            state: PipelineState::Ready,
            messages: vec![
                DisplayMessage::provisional(1, Role::User, "q"),
                DisplayMessage::notice(1, "n".to_string()),
            ],
            sending: true,
            input: String::new(),
            load_generation: 1,
        };
        let key = view.messages[0].key;
        let stored = Message {
            id: 10,
            chat_id: 1,
            role: Role::User,
            content: "q".to_string(),
        };

        reconcile(&mut view, key, &stored);
        assert_eq!(view.messages[0].key, MessageKey::Persisted(10));
        assert_eq!(view.messages.len(), 2);

        // Second reconcile of the same message does not duplicate it
        reconcile(&mut view, key, &stored);
        assert_eq!(view.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_open_chat_loads_and_clears() {
        let (pipeline, store, _gateway, chat_id) = setup(Reply::Empty);
        store
            .database()
            .add_message(chat_id, &NewMessage::user("hello"))
            .unwrap();

        pipeline.open_chat(Some(chat_id)).await;
        assert_eq!(pipeline.state(), PipelineState::Ready);
        assert_eq!(pipeline.messages().len(), 1);

        pipeline.open_chat(None).await;
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert!(pipeline.messages().is_empty());
    }

    #[tokio::test]
    async fn test_send_success_reconciles_both_messages() {
        let (pipeline, store, gateway, chat_id) = setup(Reply::Text("Try Portugal."));
        pipeline.open_chat(Some(chat_id)).await;

        let outcome = pipeline.send("Where should I go in March?").await;
        assert_eq!(outcome, SendOutcome::Replied);
        assert!(!pipeline.is_sending());

        let view = pipeline.messages();
        assert_eq!(view.len(), 2);
        assert!(view.iter().all(|m| m.id().is_some()));
        assert_eq!(view[0].role, Role::User);
        assert_eq!(view[1].content, "Try Portugal.");

        let stored = store.database().get_messages(chat_id).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(view[0].id(), Some(stored[0].id));
        assert_eq!(view[1].id(), Some(stored[1].id));

        let histories = gateway.histories.lock().unwrap();
        assert_eq!(histories.len(), 1);
        assert_eq!(histories[0].len(), 1);
        assert_eq!(histories[0][0].content, "Where should I go in March?");
    }

    #[tokio::test]
    async fn test_reply_is_stored_as_assistant() {
        let (pipeline, store, _gateway, chat_id) = setup(Reply::AsUser("Try Portugal."));
        pipeline.open_chat(Some(chat_id)).await;

        assert_eq!(pipeline.send("Where to?").await, SendOutcome::Replied);

        let stored = store.database().get_messages(chat_id).unwrap();
        assert_eq!(stored[1].role, Role::Assistant);
        assert_eq!(pipeline.messages()[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_history_excludes_notices() {
        let (pipeline, _store, gateway, chat_id) = setup(Reply::Fail("down"));
        pipeline.open_chat(Some(chat_id)).await;
        pipeline.send("first").await;

        let view = pipeline.messages();
        assert!(view.iter().any(|m| m.is_notice()));

        pipeline.send("second").await;
        let histories = gateway.histories.lock().unwrap();
        let contents: Vec<_> = histories[1].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_empty_reply_keeps_user_message() {
        let (pipeline, store, _gateway, chat_id) = setup(Reply::Empty);
        pipeline.open_chat(Some(chat_id)).await;

        let outcome = pipeline.send("hello?").await;
        assert_eq!(outcome, SendOutcome::NoReply);
        assert!(!pipeline.is_sending());

        let view = pipeline.messages();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].content, "hello?");
        assert!(view[0].id().is_some());
        assert_eq!(store.database().count_messages(chat_id).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_send_to_deleted_chat_fails_cleanly() {
        let (pipeline, store, gateway, chat_id) = setup(Reply::Text("unused"));
        pipeline.open_chat(Some(chat_id)).await;
        store.database().delete_chat(chat_id).unwrap();

        let outcome = pipeline.send("anyone?").await;
        assert!(matches!(outcome, SendOutcome::Failed(_)));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);

        let view = pipeline.messages();
        assert_eq!(view.len(), 1);
        assert!(view[0].is_notice());
        assert!(view[0].content.starts_with("Error: Could not get response."));
        assert!(!pipeline.is_sending());
    }

    #[tokio::test]
    async fn test_send_rejections() {
        let (pipeline, _store, gateway, chat_id) = setup(Reply::Text("hi"));

        assert_eq!(
            pipeline.send("no chat open").await,
            SendOutcome::Skipped(SkipReason::NoChat)
        );

        pipeline.open_chat(Some(chat_id)).await;
        assert_eq!(
            pipeline.send("   \n").await,
            SendOutcome::Skipped(SkipReason::EmptyInput)
        );
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
        assert!(pipeline.messages().is_empty());
    }

    #[tokio::test]
    async fn test_submit_takes_input() {
        let (pipeline, store, _gateway, chat_id) = setup(Reply::Text("hi"));
        pipeline.open_chat(Some(chat_id)).await;

        pipeline.set_input("   ");
        assert_eq!(
            pipeline.submit().await,
            SendOutcome::Skipped(SkipReason::EmptyInput)
        );
        assert_eq!(pipeline.input(), "   ");

        pipeline.set_input("hello");
        assert_eq!(pipeline.submit().await, SendOutcome::Replied);
        assert_eq!(pipeline.input(), "");
        assert_eq!(store.database().count_messages(chat_id).unwrap(), 2);
    }
}
