//! Relay client helpers
//!
//! Provides the two peer roles of the relay:
//! - [`FramePublisher`] identifies itself as the producer and pushes frames
//! - [`FrameViewer`] receives frames and reconnects when the relay goes away

pub mod config;
pub mod publisher;
pub mod viewer;

pub use config::ClientConfig;
pub use publisher::{FramePublisher, PublishEvent};
pub use viewer::{FrameViewer, ViewerEvent};
