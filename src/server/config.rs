//! Server configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::relay::DEFAULT_PRODUCER_TOKEN;

/// Port used when `PORT` is not set
pub const DEFAULT_PORT: u16 = 3000;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Token a producer sends as its first message
    pub producer_token: String,

    /// WebSocket upgrade must complete within this time
    pub handshake_timeout: Duration,

    /// Interval between server pings (None = no pings)
    pub heartbeat_interval: Option<Duration>,

    /// Close a connection with no inbound traffic for this long
    ///
    /// Checked on every heartbeat, so it has no effect without one.
    pub idle_timeout: Option<Duration>,

    /// Frames that may wait per viewer before the oldest is replaced
    pub viewer_queue_depth: usize,

    /// Close the old producer connection when a new producer identifies
    pub close_displaced_producer: bool,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            max_connections: 0, // Unlimited
            producer_token: DEFAULT_PRODUCER_TOKEN.to_string(),
            handshake_timeout: Duration::from_secs(10),
            heartbeat_interval: Some(Duration::from_secs(30)),
            idle_timeout: Some(Duration::from_secs(90)),
            viewer_queue_depth: 1, // Latest-wins, no backlog
            close_displaced_producer: false,
            tcp_nodelay: true, // Frames are latency sensitive
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Build a config from the `HOST` and `PORT` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an environment-style lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("HOST") {
            let ip: IpAddr = host
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("HOST is not an IP address: {:?}", host)))?;
            config.bind_addr.set_ip(ip);
        }

        if let Some(port) = lookup("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("PORT is not a valid port: {:?}", port)))?;
            config.bind_addr.set_port(port);
        }

        Ok(config)
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the producer identification token
    pub fn producer_token(mut self, token: impl Into<String>) -> Self {
        self.producer_token = token.into();
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set heartbeat interval
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Disable server pings and idle detection
    pub fn disable_heartbeat(mut self) -> Self {
        self.heartbeat_interval = None;
        self.idle_timeout = None;
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set per-viewer queue depth (at least 1)
    pub fn viewer_queue_depth(mut self, depth: usize) -> Self {
        self.viewer_queue_depth = depth.max(1);
        self
    }

    /// Close displaced producers instead of leaving them orphaned
    pub fn close_displaced_producer(mut self, close: bool) -> Self {
        self.close_displaced_producer = close;
        self
    }
}
