//! Ingestor Binary
//!
//! Loads the JSON configuration named by `INGESTOR_CONFIG` (default
//! `ingestor.json`), starts the ingestor with a logging handler attached and
//! runs until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use blockevents_ingestor::handlers::LoggingHandler;
use blockevents_ingestor::{EventBus, Ingestor, IngestorConfig};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_CONFIG_PATH: &str = "ingestor.json";

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::var("INGESTOR_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = IngestorConfig::from_file(&path).with_context(|| format!("loading {path}"))?;
    info!(path = %path, contracts = config.contracts.len(), "Configuration loaded");

    let bus = Arc::new(EventBus::new());
    bus.subscribe_all(Arc::new(LoggingHandler));

    let mut ingestor = Ingestor::connect(config, bus).await?;
    ingestor.start();

    tokio::signal::ctrl_c().await?;
    ingestor.shutdown();
    Ok(())
}
