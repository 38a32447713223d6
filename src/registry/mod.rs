//! Channel registry
//!
//! Holds the viewer set and the single producer slot. This is the only shared
//! mutable state in the relay; every transition happens under one lock so a
//! channel is never observed in both slots.
//!
//! ```text
//!                 Arc<ChannelRegistry>
//!            ┌──────────────────────────────┐
//!            │ producer: Option<Channel>    │
//!            │ viewers:  HashMap<Id, Chan>  │
//!            └──────────────┬───────────────┘
//!                           │
//!        ┌──────────────────┼──────────────────┐
//!        ▼                  ▼                  ▼
//!   promote_to_producer  register_viewer   snapshot_viewers
//!   (producer conn)      (any conn)        (Broadcaster)
//! ```

pub mod entry;
pub mod error;
pub mod store;

pub use entry::{RegistryStats, Role};
pub use error::RegistryError;
pub use store::ChannelRegistry;
