use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::mapper::GeoMapper;
use crate::messaging::MessageStream;

/// Moves messages from the input streams through the mapper to the output streams.
pub struct Worker<S: MessageStream> {
    stream: S,
    mapper: Arc<GeoMapper>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct WorkerStats {
    pub forwarded: u64,
    pub rejected: u64,
}

impl<S: MessageStream> Worker<S> {
    pub fn new(stream: S, mapper: Arc<GeoMapper>) -> Self {
        Self { stream, mapper }
    }

    /// Handles one batch. Undecodable messages are dropped, transport errors are returned.
    pub async fn step(&mut self, stats: &mut WorkerStats) -> Result<()> {
        for message in self.stream.receive().await? {
            match self.mapper.get(&message.payload) {
                Ok(output) => {
                    self.stream.publish(&message.stream_id, &output).await?;
                    stats.forwarded += 1;
                }
                Err(e) => {
                    warn!("Dropping message from {}: {}", message.stream_id, e);
                    stats.rejected += 1;
                }
            }
        }
        Ok(())
    }

    /// Runs until `shutdown` flips to true or the transport fails.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<WorkerStats> {
        let mut stats = WorkerStats::default();
        info!("Worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                result = self.step(&mut stats) => {
                    if let Err(e) = result {
                        error!("Worker stopped: {}", e);
                        return Err(e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown channel closed");
                        break;
                    }
                }
            }
        }

        info!(
            "Worker finished: {} forwarded, {} rejected",
            stats.forwarded, stats.rejected
        );
        Ok(stats)
    }
}
