//! Message definitions shared by the broker, the transport and the consumers.
//!
//! - `EntityPath` names a queue, a topic, or a subscription on a topic.
//! - `OutgoingMessage` is what a publisher hands to a sender.
//! - `Envelope` is one delivery of a message, owned by the source until the
//!   consumer settles it with exactly one disposition.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Application property carrying the message classification.
pub const MESSAGE_TYPE_PROPERTY: &str = "MessageType";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityPath {
    Queue { name: String },
    Topic { name: String },
    Subscription { topic: String, name: String },
}

impl EntityPath {
    pub fn queue(name: impl Into<String>) -> Self {
        EntityPath::Queue { name: name.into() }
    }

    pub fn topic(name: impl Into<String>) -> Self {
        EntityPath::Topic { name: name.into() }
    }

    pub fn subscription(topic: impl Into<String>, name: impl Into<String>) -> Self {
        EntityPath::Subscription {
            topic: topic.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for EntityPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityPath::Queue { name } | EntityPath::Topic { name } => f.write_str(name),
            EntityPath::Subscription { topic, name } => {
                write!(f, "{topic}/subscriptions/{name}")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub body: Vec<u8>,
    #[serde(default)]
    pub application_properties: HashMap<String, String>,
}

impl OutgoingMessage {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            application_properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.application_properties.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub enqueued_time: DateTime<Utc>,
    pub body: Vec<u8>,
    #[serde(default)]
    pub application_properties: HashMap<String, String>,
    pub lock_token: Uuid,
    pub delivery_count: u32,
}

impl Envelope {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.application_properties.get(key).map(String::as_str)
    }

    /// The classification tag, if the publisher attached one.
    pub fn message_type(&self) -> Option<&str> {
        self.property(MESSAGE_TYPE_PROPERTY)
    }
}
