//! The `codec` module converts payloads to and from message bodies.
//!
//! Consumers and publishers are generic over [`Codec`], so the payload type
//! only needs to be encodable and decodable; [`JsonCodec`] covers any serde
//! type.

pub mod json;

pub use json::JsonCodec;

use crate::utils::error::CodecError;

pub trait Codec<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Fails when the body is not a well-formed document for `T`. Never
    /// yields a defaulted value.
    fn decode(&self, body: &[u8]) -> Result<T, CodecError>;
}

#[cfg(test)]
mod tests;
