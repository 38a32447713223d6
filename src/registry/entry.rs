//! Role and statistics types stored alongside registered channels

use crate::channel::ChannelId;

/// Role of a connection in the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Accepted, first message not seen yet
    #[default]
    Unclassified,
    /// The upstream frame source
    Producer,
    /// A downstream frame sink
    Viewer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Unclassified => write!(f, "unclassified"),
            Role::Producer => write!(f, "producer"),
            Role::Viewer => write!(f, "viewer"),
        }
    }
}

/// Point-in-time registry statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of registered viewers
    pub viewer_count: usize,
    /// Current producer, if any
    pub producer_id: Option<ChannelId>,
}

impl RegistryStats {
    /// Check if a producer is registered
    pub fn has_producer(&self) -> bool {
        self.producer_id.is_some()
    }
}
