use zonecontrol::prelude::*;
use tracing_subscriber::EnvFilter;

/// Listen address used when `ZONECONTROL_BIND` is unset.
const DEFAULT_BIND: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind = std::env::var("ZONECONTROL_BIND")
        .unwrap_or_else(|_| DEFAULT_BIND.to_owned());
    let config = ServerConfig {
        bind_addr: bind,
        ..ServerConfig::default()
    };

    let server = ZoneControlServer::builder().config(config).build().await?;
    tracing::info!(addr = %server.local_addr()?, "zonecontrol server listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("server stopped");
    Ok(())
}
