use async_trait::async_trait;
use tracing::info;

use crate::broker::Envelope;
use crate::model::Person;
use crate::utils::error::ProcessError;

/// Business logic applied to each decoded, validated payload.
///
/// Returning an error dead-letters the message as a processing failure.
/// Messages may be delivered more than once, so implementations should be
/// idempotent where they can.
#[async_trait]
pub trait Processor<T: Sync>: Send + Sync {
    async fn process(&self, payload: &T, envelope: &Envelope) -> Result<(), ProcessError>;
}

/// Logs each received person, tagged with the consumer it arrived on.
#[derive(Debug, Clone)]
pub struct LoggingProcessor {
    label: String,
}

impl LoggingProcessor {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

#[async_trait]
impl Processor<Person> for LoggingProcessor {
    async fn process(&self, person: &Person, envelope: &Envelope) -> Result<(), ProcessError> {
        info!(
            consumer = %self.label,
            message_id = %envelope.id,
            "Received person - First Name: {}, Last Name: {}",
            person.first_name,
            person.last_name
        );
        Ok(())
    }
}
