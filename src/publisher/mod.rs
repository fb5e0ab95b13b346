//! The `publisher` module implements the sending side.
//!
//! A payload is encoded with a [`Codec`], optionally tagged with a
//! classification under [`MESSAGE_TYPE_PROPERTY`], and handed to a
//! [`MessageSender`] bound to either a queue or a topic. Send failures are
//! always returned to the caller.

use tracing::info;

use crate::broker::{MESSAGE_TYPE_PROPERTY, MessageSender, OutgoingMessage};
use crate::codec::Codec;
use crate::model::Person;
use crate::utils::error::PublishError;

/// Encodes `payload` and sends it. Empty classifications are treated as
/// absent. Returns the broker-assigned message id.
pub async fn publish<S, C, T>(
    sender: &S,
    codec: &C,
    payload: &T,
    classification: Option<&str>,
) -> Result<String, PublishError>
where
    S: MessageSender + ?Sized,
    C: Codec<T>,
{
    let classification = classification.filter(|t| !t.is_empty());
    let body = codec.encode(payload)?;
    let mut message = OutgoingMessage::new(body);
    if let Some(tag) = classification {
        message = message.with_property(MESSAGE_TYPE_PROPERTY, tag);
    }

    let message_id = sender.send(message).await?;
    info!(message_id = %message_id, message_type = classification.unwrap_or("Unspecified"), "Message sent");
    Ok(message_id)
}

/// A sender paired with the codec used for everything it sends.
pub struct Publisher<S, C> {
    sender: S,
    codec: C,
}

impl<S, C> Publisher<S, C>
where
    S: MessageSender,
{
    pub fn new(sender: S, codec: C) -> Self {
        Self { sender, codec }
    }

    pub async fn publish<T>(
        &self,
        payload: &T,
        classification: Option<&str>,
    ) -> Result<String, PublishError>
    where
        C: Codec<T>,
    {
        publish(&self.sender, &self.codec, payload, classification).await
    }

    /// Applies the full entry rule (required, 2 to 50 characters) before
    /// sending.
    pub async fn publish_person(
        &self,
        person: &Person,
        classification: Option<&str>,
    ) -> Result<String, PublishError>
    where
        C: Codec<Person>,
    {
        person.validate()?;
        self.publish(person, classification).await
    }

    pub fn into_sender(self) -> S {
        self.sender
    }
}
