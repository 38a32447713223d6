//! Statistics for relay sessions and the relay as a whole

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::relay::BroadcastReport;

/// Session-level statistics
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Data messages received from the peer
    pub messages_received: u64,
    /// Total payload bytes received
    pub bytes_received: u64,
    /// Frames written to the peer
    pub messages_sent: u64,
    /// Total payload bytes sent
    pub bytes_sent: u64,
    /// Connection duration
    pub duration: Duration,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.messages_received += 1;
        self.bytes_received += bytes as u64;
    }

    pub fn record_sent(&mut self, bytes: usize) {
        self.messages_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    /// Average inbound rate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration.as_secs();
        if secs > 0 {
            (self.bytes_received * 8) / secs
        } else {
            0
        }
    }
}

/// Relay-wide counters
///
/// Updated lock-free from every connection task.
#[derive(Debug)]
pub struct RelayStats {
    started_at: Instant,
    connections_accepted: AtomicU64,
    connections_active: AtomicU64,
    connections_rejected: AtomicU64,
    producers_registered: AtomicU64,
    frames_received: AtomicU64,
    frames_ignored: AtomicU64,
    frames_delivered: AtomicU64,
    frames_skipped: AtomicU64,
    frames_dropped: AtomicU64,
}

/// Plain copy of [`RelayStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    /// Connections that completed the WebSocket upgrade
    pub connections_accepted: u64,
    /// Connections currently open
    pub connections_active: u64,
    /// Connections refused by the connection limit
    pub connections_rejected: u64,
    /// Successful producer identifications
    pub producers_registered: u64,
    /// Frames received from the current producer
    pub frames_received: u64,
    /// Frames from a displaced producer that were not relayed
    pub frames_ignored: u64,
    /// Per-viewer deliveries
    pub frames_delivered: u64,
    /// Per-viewer skips because the viewer was not open
    pub frames_skipped: u64,
    /// Frames a viewer never got: its task was gone or a newer frame replaced it
    pub frames_dropped: u64,
    /// Time since the stats were created
    pub uptime: Duration,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            connections_accepted: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            producers_registered: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_ignored: AtomicU64::new(0),
            frames_delivered: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        let _ = self
            .connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn producer_registered(&self) {
        self.producers_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_ignored(&self) {
        self.frames_ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Accumulate the outcome of one broadcast
    pub fn record_broadcast(&self, report: &BroadcastReport) {
        self.frames_delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.frames_skipped
            .fetch_add(report.skipped as u64, Ordering::Relaxed);
        self.frames_dropped
            .fetch_add((report.dropped + report.replaced) as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            producers_registered: self.producers_registered.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_ignored: self.frames_ignored.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_stats_new() {
        let stats = SessionStats::new();
        assert_eq!(stats.messages_received, 0);
        assert_eq!(stats.bytes_received, 0);
        assert_eq!(stats.messages_sent, 0);
        assert_eq!(stats.bytes_sent, 0);
    }

    #[test]
    fn test_session_stats_record() {
        let mut stats = SessionStats::new();
        stats.record_received(100);
        stats.record_received(50);
        stats.record_sent(10);

        assert_eq!(stats.messages_received, 2);
        assert_eq!(stats.bytes_received, 150);
        assert_eq!(stats.messages_sent, 1);
        assert_eq!(stats.bytes_sent, 10);
    }

    #[test]
    fn test_session_stats_bitrate() {
        let mut stats = SessionStats::new();
        stats.bytes_received = 1_000_000;
        stats.duration = Duration::from_secs(10);

        // 1,000,000 bytes * 8 bits / 10 seconds
        assert_eq!(stats.bitrate(), 800_000);
    }

    #[test]
    fn test_session_stats_bitrate_zero_duration() {
        let mut stats = SessionStats::new();
        stats.bytes_received = 1_000_000;

        assert_eq!(stats.bitrate(), 0);
    }

    #[test]
    fn test_relay_stats_connections() {
        let stats = RelayStats::new();
        stats.connection_opened();
        stats.connection_opened();
        stats.connection_closed();
        stats.connection_rejected();

        let snap = stats.snapshot();
        assert_eq!(snap.connections_accepted, 2);
        assert_eq!(snap.connections_active, 1);
        assert_eq!(snap.connections_rejected, 1);
    }

    #[test]
    fn test_relay_stats_active_never_underflows() {
        let stats = RelayStats::new();
        stats.connection_closed();

        assert_eq!(stats.snapshot().connections_active, 0);
    }

    #[test]
    fn test_relay_stats_broadcast() {
        let stats = RelayStats::new();
        stats.frame_received();
        stats.record_broadcast(&BroadcastReport {
            delivered: 2,
            skipped: 1,
            dropped: 0,
            replaced: 1,
        });
        stats.record_broadcast(&BroadcastReport {
            delivered: 1,
            skipped: 0,
            dropped: 3,
            replaced: 0,
        });

        let snap = stats.snapshot();
        assert_eq!(snap.frames_received, 1);
        assert_eq!(snap.frames_delivered, 3);
        assert_eq!(snap.frames_skipped, 1);
        assert_eq!(snap.frames_dropped, 4);
    }
}
