//! TSP - standalone measurement publisher
//!
//! # Usage
//!
//! ```bash
//! # Listen with defaults (port 7165, no metadata)
//! tsp
//!
//! # Load settings and publish a metadata document
//! tsp --config configs/tsp.toml --metadata configs/metadata.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use tsp_config::{Config, LogFormat};
use tsp_publisher::{MetadataDocument, Publisher, TracingCallbacks};

/// TSP - standalone measurement publisher
#[derive(Parser, Debug)]
#[command(name = "tsp")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (error if specified but not found)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Command channel port. Overrides config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// JSON metadata document to publish at startup
    #[arg(short, long)]
    metadata: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let directives = config.log.directives(cli.log_level.as_deref());
    init_logging(&directives, config.log.format)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        "TSP publisher starting"
    );

    if let Err(e) = run(cli, config).await {
        error!(error = %e, "publisher error");
        return Err(e);
    }

    info!("TSP publisher shutdown complete");
    Ok(())
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let mut settings = publisher_config(&config.publisher);
    if let Some(port) = cli.port {
        settings.port = port;
    }

    let publisher = Publisher::with_callbacks(settings, Arc::new(TracingCallbacks));

    if let Some(path) = &cli.metadata {
        let document = load_document(path)?;
        let dataset = publisher
            .define_metadata_from_document(&document)
            .context("failed to define metadata")?;
        info!(
            path = %path.display(),
            tables = dataset.table_count(),
            "metadata defined"
        );
    }

    let addr = publisher
        .initialize()
        .await
        .context("failed to start publisher")?;
    info!(
        command = %addr,
        data = ?publisher.data_channel_addr(),
        "accepting subscribers"
    );

    wait_for_shutdown().await;
    info!(sessions = publisher.session_count(), "shutdown signal received");

    publisher.shutdown().await;

    let stats = publisher.statistics();
    info!(
        command_bytes = stats.command_bytes,
        data_bytes = stats.data_bytes,
        measurements = stats.measurements,
        "final statistics"
    );
    Ok(())
}

/// Load the config file, or defaults when none is given
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file not found: {}", path.display());
            }
            Config::from_file(path).context("failed to load configuration")
        }
        None => Ok(Config::default()),
    }
}

fn load_document(path: &Path) -> Result<MetadataDocument> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read metadata file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("invalid metadata document {}", path.display()))
}

/// Map the file settings onto the runtime publisher settings
fn publisher_config(file: &tsp_config::PublisherConfig) -> tsp_publisher::PublisherConfig {
    tsp_publisher::PublisherConfig {
        port: file.port,
        ipv6: file.ipv6,
        metadata_refresh_allowed: file.metadata_refresh_allowed,
        nan_value_filter_allowed: file.nan_value_filter_allowed,
        nan_value_filter_forced: file.nan_value_filter_forced,
        cipher_key_rotation_period: file.cipher_key_rotation_period,
        max_connections: file.max_connections,
        handshake_timeout: file.handshake_timeout,
        write_timeout: file.write_timeout,
        max_consecutive_write_failures: file.max_consecutive_write_failures,
        send_queue_size: file.send_queue_size,
        compress_metadata: file.compress_metadata,
        heartbeat_interval: file.heartbeat_interval,
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(directives: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(directives)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    match format {
        LogFormat::Console => tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init(),
    }

    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
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
}
