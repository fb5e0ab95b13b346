//! The `consumer` module implements the receiving side: a sequential
//! consumption loop that filters, decodes, validates and processes each
//! message, then settles it with a single disposition.

pub mod engine;
pub mod filter;
pub mod processor;

pub use engine::{
    ConsumerStats, Consumer, DESERIALIZATION_ERROR, DeadLetterReason, Outcome, PROCESSING_ERROR,
};
pub use filter::{MessageFilter, matches};
pub use processor::{LoggingProcessor, Processor};

#[cfg(test)]
mod tests;
