use thiserror::Error;
use tracing::trace;

use crate::types::SaeMessage;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to decode message: {0}")]
    Decode(String),

    #[error("Failed to encode message: {0}")]
    Encode(String),
}

pub fn encode(message: &SaeMessage) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(message).map_err(|e| CodecError::Encode(e.to_string()))
}

pub fn decode(bytes: &[u8]) -> Result<SaeMessage, CodecError> {
    bincode::deserialize(bytes).map_err(|e| {
        trace!("Rejected {} byte payload", bytes.len());
        CodecError::Decode(e.to_string())
    })
}
