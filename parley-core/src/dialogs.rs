//! Confirmation and text-prompt capability supplied by the UI shell.

use std::collections::VecDeque;
use std::sync::Mutex;

/// User dialogs the core may ask for.
pub trait Dialogs {
    /// Ask a yes/no question.
    fn confirm(&self, text: &str) -> bool;

    /// Ask for a line of text; `None` means the user cancelled.
    fn prompt_text(&self, text: &str, default: &str) -> Option<String>;
}

/// Dialogs answered from a fixed script.
///
/// Used by non-interactive front ends (`--yes`) and tests.
#[derive(Debug, Default)]
pub struct ScriptedDialogs {
    confirm: bool,
    answers: Mutex<VecDeque<Option<String>>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedDialogs {
    /// Dialogs that confirm everything and accept prompt defaults.
    pub fn accepting() -> Self {
        Self {
            confirm: true,
            ..Default::default()
        }
    }

    /// Dialogs that decline confirmations and cancel prompts.
    pub fn declining() -> Self {
        Self::default()
    }

    /// Queue an answer for the next prompt (`None` cancels it).
    pub fn with_answer(self, answer: Option<&str>) -> Self {
        self.answers
            .lock()
            .unwrap()
            .push_back(answer.map(str::to_string));
        self
    }

    /// Every question asked so far.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl Dialogs for ScriptedDialogs {
    fn confirm(&self, text: &str) -> bool {
        self.asked.lock().unwrap().push(text.to_string());
        self.confirm
    }

    fn prompt_text(&self, text: &str, default: &str) -> Option<String> {
        self.asked.lock().unwrap().push(text.to_string());
        match self.answers.lock().unwrap().pop_front() {
            Some(answer) => answer,
            None if self.confirm => Some(default.to_string()),
            None => None,
        }
    }
}
