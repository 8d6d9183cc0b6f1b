//! HTTP client for OpenAI-compatible `/chat/completions` endpoints
//!
//! Defaults target OpenRouter, which also expects the `HTTP-Referer` and
//! `X-Title` attribution headers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::config::CompletionConfig;
use crate::error::{Error, Result};
use crate::types::{CompletionMessage, Role};

use super::CompletionGateway;

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [CompletionMessage],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// HTTP-backed [`CompletionGateway`]
pub struct OpenRouterClient {
    model: String,
    http_client: reqwest::Client,
    url: String,
}

impl OpenRouterClient {
    /// Create a new client from configuration
    ///
    /// Returns an error if the configuration is invalid or missing required fields.
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        config.validate()?;

        let url = format!(
            "{}/chat/completions",
            config.base_url.trim_end_matches('/')
        );

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(api_key) = &config.api_key {
            let auth_value = format!("Bearer {}", api_key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?,
            );
        }

        headers.insert(
            "HTTP-Referer",
            HeaderValue::from_str(&config.referer)
                .map_err(|e| Error::Config(format!("invalid referer: {}", e)))?,
        );
        headers.insert(
            "X-Title",
            HeaderValue::from_str(&config.title)
                .map_err(|e| Error::Config(format!("invalid title: {}", e)))?,
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            http_client,
            url,
        })
    }

    /// The model requests are sent to
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionGateway for OpenRouterClient {
    async fn complete(&self, history: &[CompletionMessage]) -> Result<Option<CompletionMessage>> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: history,
        };

        tracing::debug!(
            model = %self.model,
            history_len = history.len(),
            "Requesting completion"
        );

        let response = self
            .http_client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Completion(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Completion(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Completion(format!(
                "API error ({}): {}",
                status, body
            )));
        }

        parse_completion_response(&body)
    }
}

/// Extract the first choice of a `/chat/completions` response body.
///
/// No choices, or a choice without text, yields `Ok(None)`.
pub fn parse_completion_response(body: &str) -> Result<Option<CompletionMessage>> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| Error::Completion(format!("failed to parse response: {}", e)))?;

    let Some(choice) = parsed.choices.into_iter().next() else {
        tracing::warn!("Completion response contained no choices");
        return Ok(None);
    };

    let content = match choice.message.content {
        Some(content) if !content.trim().is_empty() => content,
        _ => {
            tracing::warn!("Completion response contained no message content");
            return Ok(None);
        }
    };

    let role = choice
        .message
        .role
        .and_then(|r| r.parse().ok())
        .unwrap_or(Role::Assistant);

    Ok(Some(CompletionMessage { role, content }))
}
