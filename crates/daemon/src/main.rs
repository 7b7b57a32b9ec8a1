//! Portability Transfer Engine - Main Entry Point

use anyhow::Result;
use portability_core::application::ExtensionFactory;
use portability_daemon::logging::init_logging;
use portability_daemon::{start, Settings};
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Provider adapters compiled into this binary
fn extensions() -> Vec<Box<dyn ExtensionFactory>> {
    Vec::new()
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env()?;
    let _log_guard = init_logging(&settings)?;

    info!("Portability Transfer Engine v{} starting...", VERSION);

    let app = start(&settings, extensions()).await?;
    info!(
        rpc = %app.rpc_addr,
        gateway = %app.gateway_addr,
        "System ready. Press Ctrl+C to shutdown"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    app.shutdown().await
}
