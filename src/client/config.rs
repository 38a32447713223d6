//! Client configuration

use std::time::Duration;

use crate::relay::DEFAULT_PRODUCER_TOKEN;

/// Configuration shared by publishers and viewers
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay URL, e.g. `ws://localhost:3000`
    pub url: String,

    /// Token sent by a publisher as its first message
    pub producer_token: String,

    /// WebSocket handshake must complete within this time
    pub connect_timeout: Duration,

    /// Wait between viewer reconnect attempts
    pub reconnect_delay: Duration,

    /// Give up after this many consecutive failed attempts (None = never)
    pub max_reconnect_attempts: Option<u32>,

    /// Capacity of the event channel
    pub event_buffer: usize,
}

impl ClientConfig {
    /// Create a config for the given relay URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            producer_token: DEFAULT_PRODUCER_TOKEN.to_string(),
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(3),
            max_reconnect_attempts: None,
            event_buffer: 256,
        }
    }

    /// Set the producer identification token
    pub fn producer_token(mut self, token: impl Into<String>) -> Self {
        self.producer_token = token.into();
        self
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set reconnect delay
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Limit consecutive reconnect attempts
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }
}
