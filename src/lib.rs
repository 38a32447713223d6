//! Single-producer WebSocket frame relay
//!
//! One upstream producer (typically a camera) connects and identifies itself
//! with a token; every later message it sends is a frame that gets fanned out,
//! unmodified, to every connected viewer.
//!
//! ```text
//!   [Producer] ──ws──► Connection ──► Broadcaster ──► snapshot_viewers()
//!                                                        │
//!                          ┌─────────────────────────────┼──────────────┐
//!                          ▼                             ▼              ▼
//!                      [Viewer]                      [Viewer]       [Viewer]
//! ```
//!
//! Delivery is best-effort and latest-wins: a viewer that is not open misses
//! the frame, and a viewer still writing an earlier frame gets the newest one
//! next while the stale pending one is discarded.
//!
//! # Example
//! ```no_run
//! use frame_relay::{RelayServer, ServerConfig};
//!
//! # async fn example() -> frame_relay::Result<()> {
//! let config = ServerConfig::from_env()?;
//! let server = RelayServer::new(config);
//! server.run().await
//! # }
//! ```

pub mod channel;
pub mod client;
pub mod error;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
pub mod stats;

pub use channel::{Channel, ChannelId, ChannelState, Frame, FramePayload};
pub use error::{Error, Result};
pub use registry::{ChannelRegistry, RegistryError, Role};
pub use relay::{BroadcastReport, Broadcaster, RoleClassifier, DEFAULT_PRODUCER_TOKEN};
pub use server::{RelayServer, ServerConfig};
