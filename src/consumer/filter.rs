//! Classification filter
//!
//! A subscriber may ask for only one message type. Messages without a
//! classification never match a concrete wanted value.

use std::fmt;

use crate::broker::Envelope;
use crate::model::MessageType;

/// `true` when no filter is wanted, otherwise only on exact equality.
pub fn matches(classification: Option<&str>, wanted: Option<&str>) -> bool {
    match wanted {
        None => true,
        Some(wanted) => classification == Some(wanted),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    wanted: Option<String>,
}

impl MessageFilter {
    /// Accepts every message.
    pub fn all() -> Self {
        Self { wanted: None }
    }

    pub fn only(wanted: impl Into<String>) -> Self {
        Self {
            wanted: Some(wanted.into()),
        }
    }

    pub fn wanted(&self) -> Option<&str> {
        self.wanted.as_deref()
    }

    pub fn accepts(&self, envelope: &Envelope) -> bool {
        matches(envelope.message_type(), self.wanted())
    }
}

impl From<Option<MessageType>> for MessageFilter {
    fn from(message_type: Option<MessageType>) -> Self {
        match message_type {
            Some(t) => MessageFilter::only(t.as_str()),
            None => MessageFilter::all(),
        }
    }
}

impl fmt::Display for MessageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.wanted {
            Some(wanted) => write!(f, "filtering for {wanted} messages"),
            None => f.write_str("no message type filter"),
        }
    }
}
