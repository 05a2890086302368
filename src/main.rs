use std::net::SocketAddr;
use std::path::PathBuf;

use social::config::Configuration;
use social::{app, initialize_state, telemetry};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = std::env::var("CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_default();
    let config = Configuration::default().path(path).read()?;

    telemetry::init_subscriber(config.telemetry.as_ref())?;
    if let Some(err) = config.load_error() {
        tracing::error!(error = %err, "using default configuration");
    }

    let address = config.address.clone();
    let state = initialize_state(config).await?;

    let listener = TcpListener::bind(&address).await?;
    tracing::info!(%address, "server listening");

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "cannot listen for shutdown signal");
    }

    tracing::info!("shutting down");
}
