//! # personbus
//!
//! `personbus` publishes and consumes `Person` records through a message
//! broker, over point-to-point queues and over topics whose subscribers
//! filter on a message-type property.
//!
//! ## Core Modules
//!
//! - `broker`: the broker abstraction (`MessageSource`, `MessageSender`) and
//!   `MemoryBroker`, an in-process peek-lock broker.
//! - `consumer`: the consumption loop that filters, decodes, validates and
//!   processes messages and routes failures to dead-letter or abandon.
//! - `publisher`: encodes payloads and sends them with an optional
//!   classification.
//! - `codec`: payload encoding (`JsonCodec`).
//! - `model`: the `Person` payload and the `MessageType` tag.
//! - `transport`: the WebSocket protocol, broker server and remote handles.
//! - `config`: loading settings from files, `.env` and the environment.
//! - `cli`: startup prompts for the subscriber program.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod cli;
pub mod codec;
pub mod config;
pub mod consumer;
pub mod model;
pub mod publisher;
pub mod transport;
pub mod utils;
