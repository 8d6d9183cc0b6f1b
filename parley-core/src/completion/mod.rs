//! Completion gateway
//!
//! Turns a chat history into the next assistant turn. The gateway is stateless:
//! one request per call, no retries. Failures surface immediately.
//!
//! ## Usage
//!
//! Configure the endpoint in `~/.config/parley/config.toml`:
//!
//! ```toml
//! [completion]
//! base_url = "https://openrouter.ai/api/v1"
//! model = "openai/gpt-4o-mini"
//! api_key = "sk-or-xxxxxxxx"
//! ```

mod client;

pub use client::{parse_completion_response, OpenRouterClient};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::CompletionMessage;

/// Request/response access to a remote completion model.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Complete `history` (oldest first).
    ///
    /// Returns `Ok(None)` when the endpoint answered without usable content.
    async fn complete(&self, history: &[CompletionMessage]) -> Result<Option<CompletionMessage>>;
}
