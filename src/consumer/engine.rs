//! Consumption loop
//!
//! `Consumer` pulls one envelope at a time from a `MessageSource` and settles
//! it with exactly one disposition:
//!
//! - filtered out: completed without processing
//! - body fails to decode: dead-lettered as `DeserializationError`
//! - payload invalid or processor fails: dead-lettered as `ProcessingError`
//! - dead-lettering fails: abandoned so the source redelivers it
//! - otherwise: completed
//!
//! Failures settling a single envelope are logged and the loop moves on; the
//! source's lock expiry redelivers anything left unsettled. The loop only
//! ends on cancellation or when the source reports itself unusable.

use std::marker::PhantomData;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::filter::MessageFilter;
use super::processor::Processor;
use crate::broker::{Envelope, MessageSource, Received};
use crate::codec::Codec;
use crate::model::Validate;
use crate::utils::error::{ConsumerError, ProcessError, SourceError};

pub const DESERIALIZATION_ERROR: &str = "DeserializationError";
pub const PROCESSING_ERROR: &str = "ProcessingError";

const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    Deserialization,
    Processing,
}

impl DeadLetterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterReason::Deserialization => DESERIALIZATION_ERROR,
            DeadLetterReason::Processing => PROCESSING_ERROR,
        }
    }
}

/// Terminal disposition applied to one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Skipped,
    Completed,
    DeadLettered(DeadLetterReason),
    Abandoned,
}

/// Per-run counters, returned when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub skipped: u64,
    pub completed: u64,
    pub deserialization_failures: u64,
    pub processing_failures: u64,
    pub abandoned: u64,
    pub disposition_failures: u64,
}

impl ConsumerStats {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Skipped => self.skipped += 1,
            Outcome::Completed => self.completed += 1,
            Outcome::DeadLettered(DeadLetterReason::Deserialization) => {
                self.deserialization_failures += 1
            }
            Outcome::DeadLettered(DeadLetterReason::Processing) => self.processing_failures += 1,
            Outcome::Abandoned => self.abandoned += 1,
        }
    }
}

pub struct Consumer<S, C, P, T> {
    source: S,
    codec: C,
    processor: P,
    filter: MessageFilter,
    receive_timeout: Option<Duration>,
    error_backoff: Duration,
    label: String,
    _payload: PhantomData<fn() -> T>,
}

impl<S, C, P, T> Consumer<S, C, P, T>
where
    S: MessageSource,
    C: Codec<T>,
    P: Processor<T>,
    T: Validate + Send + Sync,
{
    pub fn new(source: S, codec: C, processor: P) -> Self {
        Self {
            source,
            codec,
            processor,
            filter: MessageFilter::all(),
            receive_timeout: None,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            label: "consumer".to_string(),
            _payload: PhantomData,
        }
    }

    pub fn with_filter(mut self, filter: MessageFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Bounds each receive call; `None` waits until a message or cancellation.
    pub fn with_receive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Pause after a non-fatal receive error before trying again.
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Name used in log lines, usually the queue or subscription.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Runs until `cancel` fires or the source fails fatally.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<ConsumerStats, ConsumerError> {
        let mut stats = ConsumerStats::default();
        info!(consumer = %self.label, filter = %self.filter, "Starting to receive messages");

        while !cancel.is_cancelled() {
            let envelope = match self.source.receive(self.receive_timeout, cancel).await {
                Ok(Received::Message(envelope)) => envelope,
                Ok(Received::Empty) => continue,
                Ok(Received::Cancelled) => break,
                Err(_) if cancel.is_cancelled() => break,
                Err(e) if e.is_fatal() => {
                    error!(consumer = %self.label, error = %e, "Critical error in message processing loop");
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(consumer = %self.label, error = %e, "Receive failed, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.error_backoff) => {}
                    }
                    continue;
                }
            };

            stats.received += 1;
            match self.handle(&envelope).await {
                Ok(outcome) => stats.record(outcome),
                Err(e) => {
                    stats.disposition_failures += 1;
                    error!(
                        consumer = %self.label,
                        message_id = %envelope.id,
                        error = %e,
                        "Failed to settle message; it will be redelivered when its lock expires"
                    );
                    if cancel.is_cancelled() {
                        break;
                    }
                    if e.is_fatal() {
                        return Err(e.into());
                    }
                }
            }
        }

        info!(consumer = %self.label, ?stats, "Receiver stopped");
        Ok(stats)
    }

    /// Decides and applies the disposition for one envelope.
    pub async fn handle(&self, envelope: &Envelope) -> Result<Outcome, SourceError> {
        let message_type = envelope.message_type().unwrap_or("Unspecified");
        info!(
            consumer = %self.label,
            message_id = %envelope.id,
            enqueued_time = %envelope.enqueued_time,
            message_type,
            delivery_count = envelope.delivery_count,
            "Received message"
        );

        if !self.filter.accepts(envelope) {
            self.source.complete(envelope).await?;
            info!(consumer = %self.label, message_id = %envelope.id, message_type, "Skipped message");
            return Ok(Outcome::Skipped);
        }

        let payload = match self.codec.decode(&envelope.body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    consumer = %self.label,
                    message_id = %envelope.id,
                    error = %e,
                    "Error deserializing message"
                );
                return self
                    .dead_letter_or_abandon(envelope, DeadLetterReason::Deserialization, &e.to_string())
                    .await;
            }
        };

        let result = match payload.ensure_valid() {
            Ok(()) => self.processor.process(&payload, envelope).await,
            Err(e) => Err(ProcessError::from(e)),
        };

        match result {
            Ok(()) => {
                self.source.complete(envelope).await?;
                info!(consumer = %self.label, message_id = %envelope.id, "Completed message");
                Ok(Outcome::Completed)
            }
            Err(e) => {
                warn!(
                    consumer = %self.label,
                    message_id = %envelope.id,
                    error = %e,
                    "Error processing message"
                );
                self.dead_letter_or_abandon(envelope, DeadLetterReason::Processing, &e.to_string())
                    .await
            }
        }
    }

    async fn dead_letter_or_abandon(
        &self,
        envelope: &Envelope,
        reason: DeadLetterReason,
        description: &str,
    ) -> Result<Outcome, SourceError> {
        match self
            .source
            .dead_letter(envelope, reason.as_str(), description)
            .await
        {
            Ok(()) => {
                info!(
                    consumer = %self.label,
                    message_id = %envelope.id,
                    reason = reason.as_str(),
                    "Message moved to dead letter queue"
                );
                Ok(Outcome::DeadLettered(reason))
            }
            Err(e) => {
                warn!(
                    consumer = %self.label,
                    message_id = %envelope.id,
                    error = %e,
                    "Error moving message to dead letter queue"
                );
                self.source.abandon(envelope).await?;
                info!(
                    consumer = %self.label,
                    message_id = %envelope.id,
                    "Message abandoned and returned to queue"
                );
                Ok(Outcome::Abandoned)
            }
        }
    }
}
