//! Terminal dialogs and the completion fallback used when no endpoint is configured.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use parley_core::{CompletionGateway, CompletionMessage, Dialogs, Error};

/// [`Dialogs`] answered on stdin.
pub struct TerminalDialogs;

impl TerminalDialogs {
    fn ask(question: &str) -> Option<String> {
        print!("{} ", question);
        io::stdout().flush().ok()?;

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }
}

impl Dialogs for TerminalDialogs {
    fn confirm(&self, text: &str) -> bool {
        matches!(
            Self::ask(&format!("{} [y/N]", text)).as_deref(),
            Some("y" | "Y" | "yes" | "Yes")
        )
    }

    fn prompt_text(&self, text: &str, default: &str) -> Option<String> {
        let answer = Self::ask(&format!("{} [{}]", text, default))?;
        if answer.is_empty() {
            Some(default.to_string())
        } else {
            Some(answer)
        }
    }
}

/// Gateway that fails every request with the configuration problem.
///
/// Lets chat management work without an API key; sends take the failure path.
pub struct UnconfiguredGateway {
    reason: String,
}

impl UnconfiguredGateway {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl CompletionGateway for UnconfiguredGateway {
    async fn complete(
        &self,
        _history: &[CompletionMessage],
    ) -> parley_core::Result<Option<CompletionMessage>> {
        Err(Error::Completion(self.reason.clone()))
    }
}
