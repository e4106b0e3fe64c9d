//! The `tessera` server binary.

use anyhow::Context;
use tessera::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = tessera::config_path();
    let config = tessera::load_config(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;

    init_logging(&config.telemetry.logging.to_log_config())
        .context("failed to initialize logging")?;
    tracing::info!(
        service = %config.telemetry.service_name,
        environment = %config.telemetry.environment,
        addr = %config.server.http_addr,
        "Starting Tessera"
    );

    let server = build_server(&config)
        .await
        .context("failed to assemble services")?;
    server
        .run_with_shutdown(ShutdownSignal::with_os_signals())
        .await
        .context("server failed")?;

    tracing::info!("Tessera stopped");
    Ok(())
}
