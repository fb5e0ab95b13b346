//! Error types shared across `personbus`.
//!
//! Each enum maps to one class of failure the consumption loop and the
//! publishing path distinguish between:
//!
//! - [`ConfigurationError`]: required settings missing at startup. Fatal.
//! - [`CodecError`]: payload bytes do not decode. Dead-lettered as
//!   `DeserializationError`.
//! - [`ValidationError`] / [`ProcessError`]: decoded payload rejected or the
//!   processor failed. Dead-lettered as `ProcessingError`.
//! - [`SourceError`]: the broker or a disposition call failed.
//! - [`PublishError`]: a send failed. Always returned to the caller.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("missing required configuration value `{0}`")]
    Missing(String),

    #[error("no valid selection after {0} attempts")]
    SelectionExhausted(usize),

    #[error("failed to read input: {0}")]
    Input(#[from] std::io::Error),

    #[error(transparent)]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{0}")]
    Decode(#[source] serde_json::Error),

    #[error("{0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("{field} must be between {min} and {max} characters")]
    Length {
        field: &'static str,
        min: usize,
        max: usize,
    },
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Person has missing required fields: {0}")]
    Invalid(#[from] ValidationError),

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("message source is closed")]
    Closed,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("lock {0} is not held or has expired")]
    LockLost(Uuid),

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("broker rejected request: {0}")]
    Remote(String),
}

impl SourceError {
    /// Fatal errors mean the source itself is unusable; anything else is
    /// scoped to a single message or request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::Closed | SourceError::Connection(_))
    }
}

impl From<tungstenite::Error> for SourceError {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                SourceError::Closed
            }
            other => SourceError::Connection(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::Protocol(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] CodecError),

    #[error("invalid payload: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to send message: {0}")]
    Transport(#[from] SourceError),
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("message source failed: {0}")]
    Source(#[from] SourceError),
}
