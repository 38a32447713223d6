//! WebSocket relay server
//!
//! Accepts TCP connections, upgrades them to WebSocket, and runs the
//! per-connection role state machine.

pub mod config;
mod connection;
pub mod listener;

pub use config::{ServerConfig, DEFAULT_PORT};
pub use listener::RelayServer;
