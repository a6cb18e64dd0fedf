//! HTTP/WebSocket edge (axum).
//!
//! Implements the public surface of the gateway: the three send routes, the
//! observer WebSocket and the static pairing page.

use std::sync::Arc;

use tokio::net::TcpListener;

use zapgate_core::{config::Config, dispatch::Dispatcher, relay::ConnectionRelay};

pub mod routes;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub relay: Arc<ConnectionRelay>,
}

/// Bind and serve until ctrl-c.
pub async fn serve(cfg: &Config, state: AppState) -> anyhow::Result<()> {
    let app = routes::app(state);

    let listener = TcpListener::bind(format!("{}:{}", cfg.host, cfg.port)).await?;
    tracing::info!("gateway listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install ctrl-c handler: {e}");
    }
    tracing::info!("shutdown signal received, stopping server...");
}
