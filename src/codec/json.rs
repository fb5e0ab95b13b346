use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::Codec;
use crate::utils::error::CodecError;

/// JSON body codec backed by `serde_json`.
#[derive(Debug)]
pub struct JsonCodec<T> {
    _payload: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _payload: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> Codec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(CodecError::Encode)
    }

    fn decode(&self, body: &[u8]) -> Result<T, CodecError> {
        // `null`, empty input and missing fields all surface as serde errors
        serde_json::from_slice(body).map_err(CodecError::Decode)
    }
}
