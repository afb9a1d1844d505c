use anyhow::{Context, Result};
use tc_node::{telemetry, NodeConfig, TimestampNode};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::from_env().context("Invalid configuration")?;
    telemetry::init_tracing(&config).context("Failed to initialize logging")?;

    info!("===========================================");
    info!("  Timestamp Chain Node v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");
    info!("Data Dir: {}", config.data_dir.display());
    info!("Authority: {}", config.authority_name);

    let mut node = TimestampNode::new(config).await?;
    node.start_background()?;

    let shutdown = node.shutdown_handle();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        let _ = shutdown.send(true);
    });

    let served = node.serve().await;
    node.shutdown().await;
    served
}
