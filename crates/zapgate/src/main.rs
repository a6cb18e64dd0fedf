use std::sync::Arc;

use zapgate_bridge::{BridgeClient, BridgeConfig};
use zapgate_core::{
    client::ChatClient, config::Config, dispatch::Dispatcher, relay::ConnectionRelay,
    session::SessionStore,
};
use zapgate_http::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    zapgate_core::logging::init("zapgate")?;

    let cfg = Arc::new(Config::load()?);

    let store = SessionStore::new(cfg.session_file.clone());
    let session = store.load()?;
    if session.is_some() {
        tracing::info!("found saved session, pairing will be skipped");
    } else {
        tracing::info!("no saved session, a QR code will be issued");
    }

    let bridge = Arc::new(BridgeClient::new(BridgeConfig {
        program: cfg.bridge_program.clone(),
        args: cfg.bridge_args.clone(),
        session,
    }));
    let client: Arc<dyn ChatClient> = bridge.clone();

    let relay = Arc::new(ConnectionRelay::new(
        client.clone(),
        store,
        cfg.status.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(client, cfg.image_file.clone()));

    tokio::spawn({
        let relay = relay.clone();
        async move {
            if let Err(e) = relay.run().await {
                tracing::error!("connection relay stopped: {e}");
            }
        }
    });

    let result = zapgate_http::serve(&cfg, AppState { dispatcher, relay }).await;

    if let Err(e) = bridge.shutdown().await {
        tracing::warn!("bridge shutdown failed: {e}");
    }

    result
}
