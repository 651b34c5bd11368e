use async_trait::async_trait;
use redis::aio::Connection;
use redis::streams::{StreamMaxlen, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

use super::{MessageStream, StreamMessage};
use crate::config::GeoMapperConfig;
use crate::error::Result;

/// Stream entry field carrying the serialized message.
pub const PAYLOAD_FIELD: &str = "proto_data";

/// Reads `input_prefix:<stream_id>` and writes `output_prefix:<stream_id>` redis streams.
pub struct RedisStreamTransport {
    connection: Connection,
    input_keys: Vec<String>,
    last_ids: Vec<String>,
    stream_ids: HashMap<String, String>,
    output_keys: HashMap<String, String>,
    output_stream_maxlen: usize,
    read_block_ms: usize,
}

impl RedisStreamTransport {
    pub async fn connect(config: &GeoMapperConfig) -> Result<Self> {
        let url = format!("redis://{}:{}/", config.redis.host, config.redis.port);
        info!("Connecting to redis at {}", url);

        let client = redis::Client::open(url)?;
        let connection = client.get_async_connection().await?;

        let mut input_keys = Vec::with_capacity(config.cameras.len());
        let mut stream_ids = HashMap::new();
        let mut output_keys = HashMap::new();
        for camera in &config.cameras {
            let input_key = config.input_stream(&camera.stream_id);
            stream_ids.insert(input_key.clone(), camera.stream_id.clone());
            output_keys.insert(camera.stream_id.clone(), config.output_stream(&camera.stream_id));
            input_keys.push(input_key);
        }

        info!("Listening on streams {:?}", input_keys);

        Ok(Self {
            connection,
            // only messages arriving after startup are processed
            last_ids: vec!["$".to_string(); input_keys.len()],
            input_keys,
            stream_ids,
            output_keys,
            output_stream_maxlen: config.redis.output_stream_maxlen,
            read_block_ms: config.redis.read_block_ms,
        })
    }
}

#[async_trait]
impl MessageStream for RedisStreamTransport {
    #[instrument(skip(self), level = "trace")]
    async fn receive(&mut self) -> Result<Vec<StreamMessage>> {
        if self.input_keys.is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(self.read_block_ms as u64)).await;
            return Ok(Vec::new());
        }

        let options = StreamReadOptions::default().count(1).block(self.read_block_ms);
        let reply: Option<StreamReadReply> = self
            .connection
            .xread_options(self.input_keys.as_slice(), self.last_ids.as_slice(), &options)
            .await?;

        let mut messages = Vec::new();
        for stream_key in reply.map(|r| r.keys).unwrap_or_default() {
            let index = self.input_keys.iter().position(|k| *k == stream_key.key);
            let (Some(index), Some(stream_id)) = (index, self.stream_ids.get(&stream_key.key).cloned()) else {
                warn!("Received entries for unexpected stream {}", stream_key.key);
                continue;
            };

            for entry in stream_key.ids {
                self.last_ids[index] = entry.id.clone();
                match entry.get::<Vec<u8>>(PAYLOAD_FIELD) {
                    Some(payload) => messages.push(StreamMessage {
                        stream_id: stream_id.clone(),
                        payload,
                    }),
                    None => warn!(
                        "Entry {} on {} has no {} field, skipping",
                        entry.id, stream_key.key, PAYLOAD_FIELD
                    ),
                }
            }
        }

        debug!("Read {} messages", messages.len());
        Ok(messages)
    }

    async fn publish(&mut self, stream_id: &str, payload: &[u8]) -> Result<()> {
        let key = match self.output_keys.get(stream_id) {
            Some(key) => key.clone(),
            None => {
                warn!("No output stream for {}, dropping message", stream_id);
                return Ok(());
            }
        };

        let _: String = self
            .connection
            .xadd_maxlen(
                key,
                StreamMaxlen::Approx(self.output_stream_maxlen),
                "*",
                &[(PAYLOAD_FIELD, payload)],
            )
            .await?;
        Ok(())
    }
}
