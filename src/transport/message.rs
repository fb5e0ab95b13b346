//! Wire protocol between remote receivers/senders and the broker server.
//!
//! Every frame is a JSON text message tagged by `type`. A connection carries
//! one request at a time: the client sends a `ClientMessage` and waits for
//! exactly one `ServerMessage` in reply.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::broker::{EntityPath, Envelope, OutgoingMessage};
use crate::utils::error::SourceError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Send {
        entity: EntityPath,
        message: OutgoingMessage,
    },
    Receive {
        entity: EntityPath,
        /// Absent means wait until a message arrives.
        timeout_ms: Option<u64>,
    },
    Complete {
        entity: EntityPath,
        lock_token: Uuid,
    },
    DeadLetter {
        entity: EntityPath,
        lock_token: Uuid,
        reason: String,
        description: String,
    },
    Abandon {
        entity: EntityPath,
        lock_token: Uuid,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    LockLost,
    EntityNotFound,
    BadRequest,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Sent { message_id: String },
    Delivered { envelope: Envelope },
    Empty {},
    Ok {},
    Error { kind: ErrorKind, message: String },
}

impl From<SourceError> for ServerMessage {
    fn from(e: SourceError) -> Self {
        let kind = match &e {
            SourceError::LockLost(_) => ErrorKind::LockLost,
            SourceError::EntityNotFound(_) => ErrorKind::EntityNotFound,
            SourceError::Protocol(_) => ErrorKind::BadRequest,
            _ => ErrorKind::Internal,
        };
        ServerMessage::Error {
            kind,
            message: e.to_string(),
        }
    }
}

impl ServerMessage {
    /// Rebuilds the client-side error for an `error` reply. `lock_token` is
    /// the token the failed request referred to, if any.
    pub fn into_source_error(self, lock_token: Option<Uuid>) -> SourceError {
        match self {
            ServerMessage::Error {
                kind: ErrorKind::LockLost,
                message,
            } => match lock_token {
                Some(token) => SourceError::LockLost(token),
                None => SourceError::Remote(message),
            },
            ServerMessage::Error {
                kind: ErrorKind::EntityNotFound,
                message,
            } => SourceError::EntityNotFound(message),
            ServerMessage::Error {
                kind: ErrorKind::BadRequest,
                message,
            } => SourceError::Protocol(message),
            ServerMessage::Error {
                kind: ErrorKind::Internal,
                message,
            } => SourceError::Remote(message),
            other => SourceError::Protocol(format!("unexpected reply: {other:?}")),
        }
    }
}
