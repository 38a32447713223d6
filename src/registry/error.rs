//! Registry error types

use crate::channel::Channel;

/// Error type for registry operations
#[derive(Debug, Clone)]
pub enum RegistryError {
    /// A different channel already held the producer slot
    ///
    /// The promotion still took effect: the new channel is now the producer
    /// and `displaced` is the one it replaced, which the caller may close.
    ProducerConflict { displaced: Channel },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::ProducerConflict { displaced } => {
                write!(f, "Producer slot was held by channel {}", displaced.id())
            }
        }
    }
}

impl std::error::Error for RegistryError {}
