//! Channel registry implementation

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::channel::{Channel, ChannelId};

use super::entry::{RegistryStats, Role};
use super::error::RegistryError;

#[derive(Default)]
struct Slots {
    producer: Option<Channel>,
    viewers: HashMap<ChannelId, Channel>,
}

/// Registry of connected viewers and the current producer
///
/// Thread-safe via a single `RwLock`. Broadcasting only needs a read lock to
/// take a snapshot, so frames never wait on each other.
pub struct ChannelRegistry {
    slots: RwLock<Slots>,
}

impl ChannelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Slots::default()),
        }
    }

    /// Add a channel to the viewer set
    ///
    /// Idempotent. A channel that currently holds the producer slot is left
    /// where it is.
    pub async fn register_viewer(&self, channel: Channel) {
        let mut slots = self.slots.write().await;
        let id = channel.id();

        if slots.producer.as_ref().is_some_and(|p| p.id() == id) {
            tracing::warn!(channel_id = %id, "Producer cannot be registered as viewer");
            return;
        }

        if slots.viewers.insert(id, channel).is_none() {
            tracing::debug!(
                channel_id = %id,
                viewers = slots.viewers.len(),
                "Viewer registered"
            );
        }
    }

    /// Make a channel the producer
    ///
    /// Removes it from the viewer set if present. The last channel promoted
    /// always wins: if a different channel already held the slot it is
    /// replaced and returned inside [`RegistryError::ProducerConflict`].
    pub async fn promote_to_producer(&self, channel: Channel) -> Result<(), RegistryError> {
        let mut slots = self.slots.write().await;
        let id = channel.id();

        slots.viewers.remove(&id);
        let previous = slots.producer.replace(channel);

        match previous {
            Some(displaced) if displaced.id() != id => {
                tracing::warn!(
                    channel_id = %id,
                    displaced = %displaced.id(),
                    "Producer replaced by newer producer"
                );
                Err(RegistryError::ProducerConflict { displaced })
            }
            _ => {
                tracing::info!(
                    channel_id = %id,
                    viewers = slots.viewers.len(),
                    "Producer registered"
                );
                Ok(())
            }
        }
    }

    /// Remove a channel from whichever slot holds it
    ///
    /// Returns the slot it was removed from, or `None` if it was not
    /// registered. Calling this again for the same channel is a no-op.
    pub async fn unregister(&self, id: ChannelId) -> Option<Role> {
        let mut slots = self.slots.write().await;

        if slots.producer.as_ref().is_some_and(|p| p.id() == id) {
            slots.producer = None;
            tracing::info!(channel_id = %id, "Producer unregistered");
            return Some(Role::Producer);
        }

        if slots.viewers.remove(&id).is_some() {
            tracing::debug!(
                channel_id = %id,
                viewers = slots.viewers.len(),
                "Viewer unregistered"
            );
            return Some(Role::Viewer);
        }

        None
    }

    /// Copy of the current viewer set
    ///
    /// Channels removed after the snapshot is taken are still in the returned
    /// list; their `try_send` simply fails.
    pub async fn snapshot_viewers(&self) -> Vec<Channel> {
        self.slots.read().await.viewers.values().cloned().collect()
    }

    /// Current producer channel
    pub async fn producer(&self) -> Option<Channel> {
        self.slots.read().await.producer.clone()
    }

    /// Id of the current producer
    pub async fn producer_id(&self) -> Option<ChannelId> {
        self.slots.read().await.producer.as_ref().map(Channel::id)
    }

    /// Check if the given channel holds the producer slot
    pub async fn is_producer(&self, id: ChannelId) -> bool {
        self.producer_id().await == Some(id)
    }

    /// Check if a producer is registered
    pub async fn has_producer(&self) -> bool {
        self.slots.read().await.producer.is_some()
    }

    /// Slot a channel is registered under
    pub async fn role_of(&self, id: ChannelId) -> Option<Role> {
        let slots = self.slots.read().await;

        if slots.producer.as_ref().is_some_and(|p| p.id() == id) {
            Some(Role::Producer)
        } else if slots.viewers.contains_key(&id) {
            Some(Role::Viewer)
        } else {
            None
        }
    }

    /// Number of registered viewers
    pub async fn viewer_count(&self) -> usize {
        self.slots.read().await.viewers.len()
    }

    /// Get registry statistics
    pub async fn stats(&self) -> RegistryStats {
        let slots = self.slots.read().await;
        RegistryStats {
            viewer_count: slots.viewers.len(),
            producer_id: slots.producer.as_ref().map(Channel::id),
        }
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
