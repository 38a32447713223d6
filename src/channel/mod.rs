//! Peer channels and the frames they carry
//!
//! A [`Channel`] is the relay's view of one WebSocket connection: an identity,
//! a lifecycle state, and a bounded latest-wins outbound slot. The connection task owns the
//! socket and drains the slot through the matching [`Outbox`].

pub mod frame;
pub mod handle;

pub use frame::{Frame, FramePayload};
pub use handle::{Channel, ChannelId, ChannelState, Delivery, Outbox, Outgoing, SendError};
