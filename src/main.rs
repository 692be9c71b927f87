//! relay-hub server entry point.
//!
//! Starts the Axum HTTP server with the health and WebSocket endpoints and
//! relays every message between connected clients.

use std::net::SocketAddr;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use relay_hub::api;
use relay_hub::app_state::AppState;
use relay_hub::config::{HubConfig, ServerConfig};
use relay_hub::hub::Hub;
use relay_hub::ws::relay::install_relay;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let server = ServerConfig::from_env()?;
    let hub_config = HubConfig::from_env();
    tracing::info!(addr = %server.listen_addr, ?hub_config, "starting relay-hub");

    // Build hub
    let hub = Hub::new(hub_config);
    install_relay(&hub);

    // Build router
    let app = api::build_router(AppState { hub: hub.clone() })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(server.listen_addr).await?;
    tracing::info!(addr = %server.listen_addr, "server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(hub))
    .await?;

    Ok(())
}

/// Resolves on Ctrl-C after sending a close frame to every session.
async fn shutdown_signal(hub: Hub) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    if let Err(e) = hub.close() {
        tracing::warn!(error = %e, "hub already closed");
    }
}
