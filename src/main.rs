//! Four-in-a-Row Game Server
//!
//! Matchmaking and authoritative match hosting over WebSocket.

use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use four_row::{
    VERSION,
    network::server::{GameServer, ServerConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;

    info!("Four-in-a-Row Server v{}", VERSION);
    info!(
        bind = %config.bind_addr,
        max_connections = config.max_connections,
        disconnect_policy = ?config.disconnect_policy,
        "configuration loaded",
    );

    let server = Arc::new(GameServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                signal_server.shutdown();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await?;

    info!("Server stopped");
    Ok(())
}
