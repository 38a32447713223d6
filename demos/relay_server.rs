//! Relay server
//!
//! Run with: cargo run --example relay_server
//!
//! Environment:
//!   PORT      listening port (default 3000)
//!   HOST      bind address (default 0.0.0.0)
//!   RUST_LOG  log filter (default info)
//!
//! The camera connects to ws://<host>:3000 and sends `raspberry-pi` (or
//! `{"type":"raspberry-pi"}`) as its first message. Every other connection
//! is a viewer and receives the camera's frames.

use std::time::Duration;

use frame_relay::{RelayServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    let server = RelayServer::new(config);

    // Periodic stats line
    let stats = std::sync::Arc::clone(server.stats());
    let registry = std::sync::Arc::clone(server.registry());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            let snap = stats.snapshot();
            let reg = registry.stats().await;
            tracing::info!(
                viewers = reg.viewer_count,
                producer = reg.has_producer(),
                frames_received = snap.frames_received,
                frames_delivered = snap.frames_delivered,
                frames_dropped = snap.frames_dropped,
                "Relay stats"
            );
        }
    });

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
