//! # parley-core
//!
//! Core library for parley - a local-first chat client for completion models.
//!
//! This library provides:
//! - Domain types for chats and messages
//! - SQLite-backed local store with schema migrations
//! - Chat list management and the optimistic message pipeline
//! - A completion gateway for OpenAI-compatible endpoints
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! A [`ChatSession`] owns one user's [`ChatListManager`] and
//! [`MessagePipeline`]. Both talk to persistence through the async
//! [`ChatStore`] trait and the pipeline asks a [`CompletionGateway`] for
//! replies. Sends are optimistic: the UI sees a message before the store has
//! confirmed it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parley_core::{ChatSession, Config, Database, OpenRouterClient, SqliteStore, StaticIdentity};
//!
//! # async fn run() -> parley_core::Result<()> {
//! let config = Config::load()?;
//!
//! let db = Database::open(&Config::database_path())?;
//! db.migrate()?;
//!
//! let session = ChatSession::new(
//!     &StaticIdentity::from(&config.identity),
//!     Arc::new(SqliteStore::new(db)),
//!     Arc::new(OpenRouterClient::new(&config.completion)?),
//!     &config.auth,
//! )?;
//! session.start().await;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use chat_list::{ChatListManager, ListState};
pub use completion::{CompletionGateway, OpenRouterClient};
pub use config::Config;
pub use db::{Database, RECENT_CHATS_LIMIT};
pub use dialogs::{Dialogs, ScriptedDialogs};
pub use error::{Error, Result};
pub use identity::{IdentityProvider, StaticIdentity};
pub use pipeline::{
    DisplayMessage, MessageKey, MessagePipeline, PipelineState, SendOutcome, SkipReason,
};
pub use session::{parse_location, ChatSession};
pub use store::{ChatStore, SqliteStore};
pub use types::*;

// Public modules
pub mod chat_list;
pub mod completion;
pub mod config;
pub mod db;
pub mod dialogs;
pub mod error;
pub mod format;
pub mod identity;
pub mod logging;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod types;
