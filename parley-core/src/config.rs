//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/parley/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/parley/` (~/.config/parley/)
//! - Data: `$XDG_DATA_HOME/parley/` (~/.local/share/parley/)
//! - State/Logs: `$XDG_STATE_HOME/parley/` (~/.local/state/parley/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable overriding the completion base URL
pub const ENV_API_URL: &str = "OPENROUTER_API_URL";
/// Environment variable overriding the completion model
pub const ENV_API_MODEL: &str = "OPENROUTER_API_MODEL";
/// Environment variable holding the completion API key
pub const ENV_API_KEY: &str = "OPENROUTER_API_KEY";
/// Environment variable overriding the logged-in identity
pub const ENV_EMAIL: &str = "PARLEY_EMAIL";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Completion endpoint configuration
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Logged-in identity
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Which identities may open a session
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// OpenAI-compatible completion endpoint configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    /// API base URL (the client appends `/chat/completions`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// API key (can also use env var)
    pub api_key: Option<String>,

    /// Value of the `HTTP-Referer` header
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Value of the `X-Title` header
    #[serde(default = "default_title")]
    pub title: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            referer: default_referer(),
            title: default_title(),
            timeout_secs: default_timeout(),
        }
    }
}

impl CompletionConfig {
    /// Apply `OPENROUTER_API_*` environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.trim().is_empty() {
                self.base_url = url;
            }
        }
        if let Ok(model) = std::env::var(ENV_API_MODEL) {
            if !model.trim().is_empty() {
                self.model = model;
            }
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var(ENV_API_KEY).ok().filter(|k| !k.is_empty());
        }
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::Config(
                "completion.base_url must not be empty".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Config(
                "completion.model must not be empty".to_string(),
            ));
        }
        if self.api_key.is_none() {
            return Err(Error::Config(format!(
                "completion.api_key (or {}) is required",
                ENV_API_KEY
            )));
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_referer() -> String {
    "https://github.com/parley-chat/parley".to_string()
}

fn default_title() -> String {
    "Parley".to_string()
}

fn default_timeout() -> u64 {
    120
}

/// Identity configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct IdentityConfig {
    /// Email used as the owner key for chats
    pub email: Option<String>,
}

/// Allow-list of identities
#[derive(Debug, Deserialize, Default, Clone)]
pub struct AuthConfig {
    /// When non-empty, only these identities may use the client
    #[serde(default)]
    pub allowed_emails: Vec<String>,
}

impl AuthConfig {
    /// Check whether an identity is allowed to open a session
    pub fn allows(&self, email: &str) -> bool {
        self.allowed_emails.is_empty()
            || self
                .allowed_emails
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(email))
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path, then apply env overrides
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Apply environment overrides on top of file values
    pub fn apply_env(&mut self) {
        self.completion.apply_env();
        if let Ok(email) = std::env::var(ENV_EMAIL) {
            if !email.trim().is_empty() {
                self.identity.email = Some(email);
            }
        }
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/parley/config.toml` (~/.config/parley/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("parley").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/parley/` (~/.local/share/parley/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("parley")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/parley/` (~/.local/state/parley/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("parley")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/parley/chats.db` (~/.local/share/parley/chats.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("chats.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/parley/parley.log` (~/.local/state/parley/parley.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("parley.log")
    }
}
