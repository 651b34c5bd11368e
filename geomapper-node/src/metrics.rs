use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::error::Result;

const GET_DURATION_BUCKETS: &[f64] = &[0.0025, 0.005, 0.0075, 0.01, 0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.25];

/// Metric handles of one mapper instance, registered in their own registry.
pub struct Metrics {
    registry: Registry,
    pub get_duration: Histogram,
    pub transform_duration: Histogram,
    pub object_counter: IntCounter,
    pub serialization_duration: Histogram,
    pub deserialization_duration: Histogram,
    pub projection_failures: IntCounter,
    pub filtered_detections: IntCounter,
    pub rejected_messages: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let get_duration = Histogram::with_opts(
            HistogramOpts::new(
                "geo_mapper_get_duration",
                "The time it takes to deserialize the message until returning the transformed result as serialized bytes",
            )
            .buckets(GET_DURATION_BUCKETS.to_vec()),
        )?;
        let transform_duration = Histogram::with_opts(HistogramOpts::new(
            "geo_mapper_transform_duration",
            "How long the coordinate transformation takes",
        ))?;
        let object_counter = IntCounter::with_opts(Opts::new(
            "geo_mapper_object_counter",
            "How many detections have been transformed",
        ))?;
        let serialization_duration = Histogram::with_opts(HistogramOpts::new(
            "geo_mapper_proto_serialization_duration",
            "The time it takes to create a serialized output message",
        ))?;
        let deserialization_duration = Histogram::with_opts(HistogramOpts::new(
            "geo_mapper_proto_deserialization_duration",
            "The time it takes to deserialize an input message",
        ))?;
        let projection_failures = IntCounter::with_opts(Opts::new(
            "geo_mapper_projection_failures",
            "How many detections could not be projected onto the ground plane",
        ))?;
        let filtered_detections = IntCounter::with_opts(Opts::new(
            "geo_mapper_filtered_detections",
            "How many projected detections fell outside their mapping area",
        ))?;
        let rejected_messages = IntCounter::with_opts(Opts::new(
            "geo_mapper_rejected_messages",
            "How many input messages could not be decoded",
        ))?;

        registry.register(Box::new(get_duration.clone()))?;
        registry.register(Box::new(transform_duration.clone()))?;
        registry.register(Box::new(object_counter.clone()))?;
        registry.register(Box::new(serialization_duration.clone()))?;
        registry.register(Box::new(deserialization_duration.clone()))?;
        registry.register(Box::new(projection_failures.clone()))?;
        registry.register(Box::new(filtered_detections.clone()))?;
        registry.register(Box::new(rejected_messages.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(prometheus::process_collector::ProcessCollector::for_self()))?;

        Ok(Self {
            registry,
            get_duration,
            transform_duration,
            object_counter,
            serialization_duration,
            deserialization_duration,
            projection_failures,
            filtered_detections,
            rejected_messages,
        })
    }

    /// Current metrics in the prometheus text format.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Serves the text exposition on every connection until the task is dropped.
pub async fn start_metrics_server(addr: String, metrics: std::sync::Arc<Metrics>) -> Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("Metrics available on http://{}/metrics", addr);

    loop {
        let (mut stream, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            // The request itself is irrelevant, every path returns the exposition
            let mut request = [0u8; 1024];
            if let Err(e) = stream.read(&mut request).await {
                debug!("Metrics request from {} failed: {}", peer, e);
                return;
            }

            let response = match metrics.render() {
                Ok(body) => format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                ),
                Err(e) => {
                    warn!("Failed to render metrics: {}", e);
                    "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                }
            };

            if let Err(e) = stream.write_all(response.as_bytes()).await {
                debug!("Failed to answer metrics request from {}: {}", peer, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_every_metric() {
        let metrics = Metrics::new().unwrap();
        metrics.object_counter.inc_by(3);
        metrics.get_duration.observe(0.004);

        let text = metrics.render().unwrap();
        assert!(text.contains("geo_mapper_object_counter 3"));
        assert!(text.contains("geo_mapper_get_duration_bucket{le=\"0.005\"} 1"));
        assert!(text.contains("geo_mapper_rejected_messages 0"));
    }

    #[test]
    fn test_instances_do_not_share_state() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.object_counter.inc();
        assert_eq!(first.object_counter.get(), 1);
        assert_eq!(second.object_counter.get(), 0);
    }
}
