//! Error types for parley-core

use thiserror::Error;

/// Main error type for the parley-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Completion endpoint error
    #[error("completion error: {0}")]
    Completion(String),

    /// Chat not found
    #[error("chat not found: {0}")]
    ChatNotFound(i64),

    /// No logged-in identity (or identity not allowed)
    #[error("not authenticated")]
    NotAuthenticated,

    /// A blocking store task failed to complete
    #[error("store task failed: {0}")]
    Task(String),
}

/// Result type alias for parley-core
pub type Result<T> = std::result::Result<T, Error>;
