//! Frame types relayed from the producer to viewers
//!
//! A frame is one WebSocket data message. The relay never looks inside it;
//! text stays text and binary stays binary on the way out.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio_tungstenite::tungstenite::Message;

/// Opaque frame payload
///
/// Cheap to clone: text is shared via `Arc<str>`, binary via `Bytes`
/// reference counting. Handing a frame to every viewer's slot only bumps a
/// reference count; the one copy per viewer happens in [`to_message`] when the
/// frame is finally written, so frames replaced while pending are never copied.
///
/// [`to_message`]: FramePayload::to_message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePayload {
    /// UTF-8 text message (e.g. a JSON envelope with a base64 image)
    Text(Arc<str>),
    /// Binary message (e.g. a raw JPEG)
    Binary(Bytes),
}

impl FramePayload {
    /// Create a text payload
    pub fn text(text: impl Into<Arc<str>>) -> Self {
        Self::Text(text.into())
    }

    /// Create a binary payload
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::Binary(data.into())
    }

    /// Extract the payload of a WebSocket data message
    ///
    /// Returns `None` for control messages (ping, pong, close).
    pub fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Self::Text(text.into())),
            Message::Binary(data) => Some(Self::Binary(Bytes::from(data))),
            _ => None,
        }
    }

    /// Build the outgoing WebSocket message for this payload
    ///
    /// Copies the payload, since tungstenite messages own their buffers.
    pub fn to_message(&self) -> Message {
        match self {
            Self::Text(text) => Message::Text(text.to_string()),
            Self::Binary(data) => Message::Binary(data.to_vec()),
        }
    }

    /// Payload viewed as text, if it is valid UTF-8
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(data) => std::str::from_utf8(data).ok(),
        }
    }

    /// Raw payload bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) => data,
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this is a text payload
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

impl From<&str> for FramePayload {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for FramePayload {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

impl From<Bytes> for FramePayload {
    fn from(data: Bytes) -> Self {
        Self::Binary(data)
    }
}

impl From<Vec<u8>> for FramePayload {
    fn from(data: Vec<u8>) -> Self {
        Self::binary(data)
    }
}

/// A frame received from the producer
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in the producer's stream, starting at 1
    pub sequence: u64,
    /// When the relay received the frame
    pub received_at: Instant,
    /// Frame data, forwarded verbatim
    pub payload: FramePayload,
}

impl Frame {
    /// Create a frame stamped with the current time
    pub fn new(sequence: u64, payload: impl Into<FramePayload>) -> Self {
        Self {
            sequence,
            received_at: Instant::now(),
            payload: payload.into(),
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
