use async_trait::async_trait;

use crate::error::Result;

pub mod redis_stream;

pub use redis_stream::RedisStreamTransport;

/// One serialized scene message read from a camera stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMessage {
    pub stream_id: String,
    pub payload: Vec<u8>,
}

/// Source and sink of serialized scene messages, keyed by camera stream id.
#[async_trait]
pub trait MessageStream: Send {
    /// Waits for the next batch of messages. An empty batch means the read timed out.
    async fn receive(&mut self) -> Result<Vec<StreamMessage>>;

    async fn publish(&mut self, stream_id: &str, payload: &[u8]) -> Result<()>;
}
