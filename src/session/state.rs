//! Per-connection session state
//!
//! Tracks the role of one connection from accept to close. The role is set
//! exactly once; how inbound messages are handled follows from it.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::channel::ChannelId;
use crate::registry::Role;
use crate::stats::SessionStats;

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Channel identity
    pub id: ChannelId,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Connection start time
    pub connected_at: Instant,

    /// Time when the role was decided
    pub classified_at: Option<Instant>,

    /// Traffic counters
    pub stats: SessionStats,

    role: Role,
    next_sequence: u64,
}

impl SessionState {
    /// Create a new, unclassified session
    pub fn new(id: ChannelId, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            connected_at: Instant::now(),
            classified_at: None,
            stats: SessionStats::default(),
            role: Role::Unclassified,
            next_sequence: 1,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Assign the role decided by the classifier
    ///
    /// Only the first assignment takes effect. Returns whether it did.
    pub fn assign_role(&mut self, role: Role) -> bool {
        if self.role != Role::Unclassified || role == Role::Unclassified {
            return false;
        }

        self.role = role;
        self.classified_at = Some(Instant::now());
        true
    }

    /// Allocate the sequence number for the next producer frame
    pub fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// Get session duration
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Statistics with the duration filled in
    pub fn stats_snapshot(&self) -> SessionStats {
        let mut stats = self.stats.clone();
        stats.duration = self.duration();
        stats
    }
}
