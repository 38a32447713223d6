//! Best-effort fan-out of producer frames to viewers

use std::sync::Arc;

use crate::channel::{Delivery, Frame, SendError};
use crate::registry::ChannelRegistry;
use crate::stats::RelayStats;

/// Outcome of a single broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Viewers the frame was handed to
    pub delivered: usize,
    /// Viewers skipped because they were not open
    pub skipped: usize,
    /// Viewers whose connection task was gone
    pub dropped: usize,
    /// Delivered viewers whose stale pending frame was overwritten
    pub replaced: usize,
}

impl BroadcastReport {
    /// Number of viewers in the snapshot the broadcast ran against
    pub fn total(&self) -> usize {
        self.delivered + self.skipped + self.dropped
    }
}

/// Delivers frames to every open viewer in the registry
///
/// Each viewer is handled in isolation: a failing viewer is counted and
/// skipped, never reported to the caller, and never retried.
pub struct Broadcaster {
    registry: Arc<ChannelRegistry>,
    stats: Arc<RelayStats>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ChannelRegistry>, stats: Arc<RelayStats>) -> Self {
        Self { registry, stats }
    }

    /// Fan a frame out to the current viewer set
    pub async fn broadcast(&self, frame: &Frame) -> BroadcastReport {
        let viewers = self.registry.snapshot_viewers().await;
        let mut report = BroadcastReport::default();

        for viewer in &viewers {
            match viewer.try_send(frame.clone()) {
                Ok(Delivery::Queued) => report.delivered += 1,
                Ok(Delivery::Replaced { sequence }) => {
                    report.delivered += 1;
                    report.replaced += 1;
                    tracing::trace!(
                        channel_id = %viewer.id(),
                        stale = sequence,
                        sequence = frame.sequence,
                        "Replaced pending frame for slow viewer"
                    );
                }
                Err(SendError::NotOpen(state)) => {
                    report.skipped += 1;
                    tracing::trace!(
                        channel_id = %viewer.id(),
                        state = ?state,
                        "Viewer not open, skipping frame"
                    );
                }
                Err(e) => {
                    report.dropped += 1;
                    tracing::debug!(
                        channel_id = %viewer.id(),
                        sequence = frame.sequence,
                        error = %e,
                        "Frame dropped for viewer"
                    );
                }
            }
        }

        self.stats.record_broadcast(&report);
        report
    }
}
