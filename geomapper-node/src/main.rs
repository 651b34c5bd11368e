use anyhow::Context;
use clap::Parser;
use geomapper::{
    config::load_config,
    messaging::RedisStreamTransport,
    metrics::{start_metrics_server, Metrics},
    worker::Worker,
    GeoMapper,
};
use std::sync::Arc;
use tokio::{signal, sync::watch};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "settings.yaml")]
    config: String,

    /// Log level, overrides the configured one
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;

    init_logging(args.log_level.as_deref().unwrap_or(&config.log_level))?;

    info!("Starting geomapper with {} cameras", config.cameras.len());

    let metrics = Arc::new(Metrics::new()?);

    // Refuse to serve with any camera we cannot model
    let mapper = Arc::new(GeoMapper::from_config(&config, metrics.clone()).context("Invalid camera setup")?);

    if config.monitoring.enable_metrics {
        let metrics_addr = format!("0.0.0.0:{}", config.monitoring.metrics_port);
        let metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(metrics_addr, metrics).await {
                error!("Metrics server failed: {}", e);
            }
        });
    }

    let transport = RedisStreamTransport::connect(&config)
        .await
        .context("Failed to connect to redis")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut worker = tokio::spawn(Worker::new(transport, mapper).run(shutdown_rx));

    let shutdown_requested = tokio::select! {
        _ = wait_for_shutdown() => true,
        result = &mut worker => {
            result.context("Worker task panicked")??;
            false
        }
    };

    if shutdown_requested {
        shutdown_tx.send(true).ok();
        worker.await.context("Worker task panicked")??;
    }

    info!("Shutting down geomapper");
    Ok(())
}

/// Accepts both tracing names and python-style names such as `WARNING` or `CRITICAL`.
fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" | "critical" | "fatal" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(level))
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to install logger")?;

    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
