//! Social-mesh service binary.

use std::sync::Arc;

use anyhow::{Context, Result};
use mesh_telemetry::{init_telemetry, TelemetryConfig};
use service_runtime::{MeshConfig, ServiceRuntime};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = MeshConfig::from_env().context("Invalid MESH_* configuration")?;

    init_telemetry(&TelemetryConfig::for_service(config.service.as_str()))
        .context("Failed to initialise telemetry")?;

    let addr = config.http.addr();
    let runtime = Arc::new(
        ServiceRuntime::connect(config)
            .await
            .context("Failed to connect to the shared store")?,
    );

    // Running without consumers would silently drop every event.
    runtime
        .start()
        .await
        .context("Failed to attach event consumers")?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let signal_runtime = Arc::clone(&runtime);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                signal_runtime.request_shutdown();
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    let served = runtime.serve(listener).await;
    runtime.shutdown().await;
    served.context("HTTP server failed")?;

    Ok(())
}
