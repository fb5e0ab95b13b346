//! The `model` module defines the payload carried through queues and topics
//! and the classification tag publishers attach to it.

pub mod message_type;
pub mod person;

pub use message_type::MessageType;
pub use person::{Person, Validate};

#[cfg(test)]
mod tests;
