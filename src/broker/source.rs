//! Narrow async interfaces over an at-least-once broker.
//!
//! `MessageSource` is the receiving side bound to one queue or
//! subscription; `MessageSender` is the sending side bound to one queue or
//! topic. Every call may suspend on I/O.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::envelope::{Envelope, OutgoingMessage};
use crate::utils::error::SourceError;

/// Outcome of a single receive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Message(Envelope),
    /// The timeout elapsed without a message.
    Empty,
    /// The cancellation token fired while waiting.
    Cancelled,
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Waits for the next message. `None` waits until a message arrives or
    /// `cancel` fires.
    async fn receive(
        &self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Received, SourceError>;

    async fn complete(&self, envelope: &Envelope) -> Result<(), SourceError>;

    async fn dead_letter(
        &self,
        envelope: &Envelope,
        reason: &str,
        description: &str,
    ) -> Result<(), SourceError>;

    async fn abandon(&self, envelope: &Envelope) -> Result<(), SourceError>;
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Returns the broker-assigned message id.
    async fn send(&self, message: OutgoingMessage) -> Result<String, SourceError>;
}
