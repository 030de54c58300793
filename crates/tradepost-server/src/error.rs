//! Server error types.

use std::fmt;

use tradepost_relay::{HistoryError, StoreError};

/// Errors that can occur in the server runtime.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, unusable data path, etc.).
    ///
    /// Fatal: fix configuration and restart.
    Config(String),

    /// Transport/network error (bind failure, accept loop I/O error).
    Transport(String),

    /// History bridge error, surfaced to HTTP callers.
    History(HistoryError),

    /// Store error during startup (opening the database).
    Store(StoreError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::History(err) => write!(f, "history error: {err}"),
            Self::Store(err) => write!(f, "store error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(_) | Self::Transport(_) => None,
            Self::History(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<HistoryError> for ServerError {
    fn from(err: HistoryError) -> Self {
        Self::History(err)
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
