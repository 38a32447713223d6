//! Crate-level error type

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::registry::RegistryError;

/// Errors surfaced by the relay server and client helpers
#[derive(Debug, Error)]
pub enum Error {
    /// Socket or listener I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol failure (handshake, framing, send)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Registry operation rejected
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Peer did not finish the WebSocket upgrade in time
    #[error("WebSocket handshake timed out")]
    HandshakeTimeout,

    /// Operation on a connection that is not (or no longer) established
    #[error("connection closed")]
    ConnectionClosed,
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
