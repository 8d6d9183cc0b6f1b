//! Database layer for parley
//!
//! This module provides the local store using SQLite with:
//! - Schema migrations and idempotent index creation
//! - Repository pattern for transactional chat/message operations

pub mod repo;
pub mod schema;

pub use repo::{Database, RECENT_CHATS_LIMIT};
