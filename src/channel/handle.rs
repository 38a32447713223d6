//! Channel handle shared between the connection task, the registry and the broadcaster

use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use super::frame::Frame;

/// Identity of an accepted connection
///
/// Only used for set membership; two handles with the same id refer to the
/// same connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Observable lifecycle state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    /// WebSocket upgrade in progress
    Connecting = 0,
    /// Ready to carry frames
    Open = 1,
    /// Close requested, not yet torn down
    Closing = 2,
    /// Connection gone
    Closed = 3,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Why a frame could not be handed to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// Channel is not in the `Open` state
    NotOpen(ChannelState),
    /// The connection task has gone away
    Disconnected,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::NotOpen(state) => write!(f, "channel not open ({:?})", state),
            SendError::Disconnected => write!(f, "connection task gone"),
        }
    }
}

impl std::error::Error for SendError {}

/// What happened to a frame handed to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued behind nothing or behind frames that still fit
    Queued,
    /// Queued, evicting the oldest pending frame
    Replaced {
        /// Sequence number of the evicted frame
        sequence: u64,
    },
}

/// Pending frames for one connection, newest at the back
struct Slot {
    pending: Mutex<Pending>,
    ready: Notify,
}

struct Pending {
    frames: VecDeque<Frame>,
    depth: usize,
    receiver_alive: bool,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, Pending> {
        // The queue is still valid if a holder panicked
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle to one peer connection
///
/// Cloning is cheap. The socket itself is owned by the connection task, which
/// drains the matching [`Outbox`].
#[derive(Clone)]
pub struct Channel {
    id: ChannelId,
    peer_addr: Option<SocketAddr>,
    state: Arc<AtomicU8>,
    slot: Arc<Slot>,
    close: Arc<Notify>,
}

/// Something the connection task has to write to the socket
#[derive(Debug)]
pub enum Outgoing {
    /// Frame to forward to the peer
    Frame(Frame),
    /// Close the connection
    Close,
}

/// Receiving side of a [`Channel`], owned by the connection task
pub struct Outbox {
    slot: Arc<Slot>,
    close: Arc<Notify>,
}

impl Channel {
    /// Create a channel in the `Connecting` state
    ///
    /// `queue_depth` bounds how many frames may wait for the socket. When it
    /// is reached the oldest pending frame is evicted, so the peer always gets
    /// the newest one next.
    pub fn new(id: ChannelId, peer_addr: Option<SocketAddr>, queue_depth: usize) -> (Self, Outbox) {
        let depth = queue_depth.max(1);
        let slot = Arc::new(Slot {
            pending: Mutex::new(Pending {
                frames: VecDeque::with_capacity(depth),
                depth,
                receiver_alive: true,
            }),
            ready: Notify::new(),
        });
        let close = Arc::new(Notify::new());

        let channel = Self {
            id,
            peer_addr,
            state: Arc::new(AtomicU8::new(ChannelState::Connecting as u8)),
            slot: Arc::clone(&slot),
            close: Arc::clone(&close),
        };

        (channel, Outbox { slot, close })
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Mark the upgrade as complete
    pub fn mark_open(&self) {
        let _ = self.state.compare_exchange(
            ChannelState::Connecting as u8,
            ChannelState::Open as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Mark the connection as torn down
    pub fn mark_closed(&self) {
        self.state.store(ChannelState::Closed as u8, Ordering::Release);
    }

    /// Hand a frame to the connection task without waiting
    ///
    /// Never blocks on a slow peer: if the slot is full the oldest pending
    /// frame is evicted and reported through [`Delivery::Replaced`].
    pub fn try_send(&self, frame: Frame) -> Result<Delivery, SendError> {
        let state = self.state();
        if state != ChannelState::Open {
            return Err(SendError::NotOpen(state));
        }

        let delivery = {
            let mut pending = self.slot.lock();
            if !pending.receiver_alive {
                return Err(SendError::Disconnected);
            }

            let evicted = if pending.frames.len() >= pending.depth {
                pending.frames.pop_front()
            } else {
                None
            };
            pending.frames.push_back(frame);

            match evicted {
                Some(old) => Delivery::Replaced {
                    sequence: old.sequence,
                },
                None => Delivery::Queued,
            }
        };

        self.slot.ready.notify_one();
        Ok(delivery)
    }

    /// Ask the connection task to close the connection
    ///
    /// No-op if the channel is already closing or closed.
    pub fn close(&self) {
        let previous = self
            .state
            .fetch_max(ChannelState::Closing as u8, Ordering::AcqRel);

        if previous < ChannelState::Closing as u8 {
            self.close.notify_one();
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state())
            .finish()
    }
}

impl Outbox {
    /// Wait for the next thing to write
    ///
    /// Close requests win over pending frames.
    pub async fn next(&mut self) -> Outgoing {
        loop {
            // A frame pushed after the emptiness check leaves a permit on `ready`
            let has_pending = !self.slot.lock().frames.is_empty();

            tokio::select! {
                biased;
                _ = self.close.notified() => return Outgoing::Close,
                _ = std::future::ready(()), if has_pending => {
                    if let Some(frame) = self.slot.lock().frames.pop_front() {
                        return Outgoing::Frame(frame);
                    }
                }
                _ = self.slot.ready.notified() => {}
            }
        }
    }

    /// Take the oldest pending frame without waiting
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.slot.lock().frames.pop_front()
    }
}

impl Drop for Outbox {
    fn drop(&mut self) {
        let mut pending = self.slot.lock();
        pending.receiver_alive = false;
        pending.frames.clear();
    }
}
