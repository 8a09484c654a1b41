//! Error types shared across the bot.
//!
//! Source fetches, LLM calls and the body of a poll cycle use `anyhow` with context;
//! the types below cover the boundaries where callers need to match on the failure.

use thiserror::Error;

/// Startup configuration problems. Raised before the bot can ever run.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is absent or blank.
    #[error("missing required setting {0}")]
    Missing(&'static str),

    /// A variable is present but cannot be used.
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    /// The asset universe file could not be read or parsed.
    #[error("asset config error: {0}")]
    Assets(String),
}

/// Persistence failures from the signal store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json column error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store connection lock poisoned")]
    Poisoned,
}

/// Errors surfaced by the bot's control operations.
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("sentiment bot is already running")]
    AlreadyRunning,

    #[error("sentiment bot is not running")]
    NotRunning,

    /// A poll cycle failed; carries the captured message that also lands in `last_error`.
    #[error("poll failed: {0}")]
    Poll(String),
}

impl BotError {
    /// Short machine-friendly code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            BotError::Config(_) => "config",
            BotError::Store(_) => "store",
            BotError::AlreadyRunning => "already_running",
            BotError::NotRunning => "not_running",
            BotError::Poll(_) => "poll_failed",
        }
    }
}
