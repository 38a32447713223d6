//! Relay core: role classification and frame fan-out

pub mod broadcaster;
pub mod classifier;

pub use broadcaster::{BroadcastReport, Broadcaster};
pub use classifier::{RoleClassifier, DEFAULT_PRODUCER_TOKEN};
