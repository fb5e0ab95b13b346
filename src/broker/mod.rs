//! The `broker` module models the message broker the demo programs talk to.
//!
//! - `envelope`: message, envelope and entity path types
//! - `source`: the `MessageSource` / `MessageSender` traits consumers and
//!   publishers are written against
//! - `entity`: per-queue / per-subscription peek-lock state
//! - `engine`: `MemoryBroker`, the in-process broker served by the transport

pub mod engine;
pub mod entity;
pub mod envelope;
pub mod source;

pub use engine::{BrokerOptions, MemoryBroker, MemoryReceiver, MemorySender};
pub use entity::{DeadLetteredMessage, MAX_DELIVERY_COUNT_EXCEEDED};
pub use envelope::{EntityPath, Envelope, MESSAGE_TYPE_PROPERTY, OutgoingMessage};
pub use source::{MessageSender, MessageSource, Received};
