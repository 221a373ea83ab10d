//! Error taxonomy for Postcast.

use thiserror::Error;

/// Result alias used across all Postcast crates.
pub type Result<T> = std::result::Result<T, PostcastError>;

/// The primary error type.
#[derive(Debug, Error)]
pub enum PostcastError {
    /// Missing or invalid startup configuration. Fatal: prevents startup.
    #[error("config error: {0}")]
    Config(String),

    /// Unparseable operator time/duration input. Recovered locally by
    /// re-prompting; never changes session state.
    #[error("format error: {0}")]
    Format(String),

    /// Persistence failure. Aborts the current poll cycle only; the next
    /// tick retries naturally.
    #[error("store error: {0}")]
    Store(String),

    /// Update-stream / transport failure on the operator channel.
    #[error("channel error: {0}")]
    Channel(String),
}

impl From<std::io::Error> for PostcastError {
    fn from(e: std::io::Error) -> Self {
        PostcastError::Config(e.to_string())
    }
}

/// Per-destination delivery failure, split by whether a retry can help.
///
/// `Retryable` covers timeouts and transient network errors and is fed to the
/// bounded-backoff retry combinator. `Terminal` covers permanent rejections
/// (destination blocked, deleted, bot lacks permission) and fails the
/// destination immediately.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    #[error("retryable send failure: {0}")]
    Retryable(String),

    #[error("terminal send failure: {0}")]
    Terminal(String),
}

impl SendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SendError::Retryable(_))
    }
}
