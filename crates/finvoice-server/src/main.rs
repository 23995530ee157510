//! Finvoice Server — application entry point.

mod app;
mod config;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("finvoice=info".parse()?))
        .json()
        .init();

    info!("Starting finvoice server...");

    let config = ServerConfig::from_env()?;
    info!(environment = %config.environment, smtp = config.smtp.is_some(), "Configuration loaded");
    if config.uses_dev_secret() {
        warn!("FINVOICE_JWT_SECRET is not set; using the development signing secret");
    }

    let app = App::build(config).await?;
    info!(
        access_token_ttl_secs = app.sessions.tokens().access_token_lifetime_secs(),
        "Services ready"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    app.shutdown().await;

    info!("finvoice server stopped.");
    Ok(())
}
