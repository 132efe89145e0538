//! Error types for the chat client.

use thiserror::Error;

/// Errors produced by the chat client core.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Send rejected by the cooldown gate.
    #[error("please wait {retry_after_ms} ms before sending another message")]
    RateLimited {
        /// Time left in the cooldown window.
        retry_after_ms: u64,
    },

    /// Blank submission, dropped before any network action.
    #[error("empty input")]
    EmptyInput,

    /// Structured `error` frame sent by the server.
    #[error("stream error: {0}")]
    Stream(String),

    /// Connection-level failure with no structured payload.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Caller passed an unknown id or an otherwise unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP client error.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding or decoding error.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Regex error.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// The driver or a stream worker went away.
    #[error("channel closed")]
    ChannelClosed,
}

impl ChatError {
    /// Whether the error should be shown to the user as a notice.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Stream(_) | Self::Transport(_)
        )
    }
}

/// Convenience result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;
