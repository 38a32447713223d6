//! Relay server listener
//!
//! Handles the TCP accept loop and spawns a task per connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::channel::ChannelId;
use crate::error::Result;
use crate::registry::ChannelRegistry;
use crate::relay::{Broadcaster, RoleClassifier};
use crate::server::config::ServerConfig;
use crate::server::connection::{Connection, RelayContext};
use crate::stats::RelayStats;

/// WebSocket frame relay server
pub struct RelayServer {
    ctx: Arc<RelayContext>,
    next_channel_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
    bound: Mutex<Option<TcpListener>>,
    local_addr: Option<SocketAddr>,
}

impl RelayServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let registry = Arc::new(ChannelRegistry::new());
        let stats = Arc::new(RelayStats::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry), Arc::clone(&stats));
        let classifier = RoleClassifier::new(config.producer_token.clone());

        Self {
            ctx: Arc::new(RelayContext {
                config,
                registry,
                broadcaster,
                classifier,
                stats,
            }),
            next_channel_id: AtomicU64::new(1),
            connection_semaphore,
            bound: Mutex::new(None),
            local_addr: None,
        }
    }

    /// Create a server and bind its listener right away
    ///
    /// Binding to port 0 picks a free port; read it back with
    /// [`local_addr`](Self::local_addr). The next `run`/`run_until` call
    /// serves from this listener.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let mut server = Self::new(config);
        server.bound = Mutex::new(Some(listener));
        server.local_addr = Some(local_addr);
        Ok(server)
    }

    /// Address the server was bound to by [`bind`](Self::bind)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.ctx.config
    }

    /// Get a reference to the channel registry
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.ctx.registry
    }

    /// Get the broadcaster fed by the producer
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.ctx.broadcaster
    }

    /// Get relay-wide statistics
    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.ctx.stats
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.ctx.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener().await?;
        self.serve(listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = self.listener().await?;
        self.serve_until(listener, shutdown).await
    }

    async fn listener(&self) -> Result<TcpListener> {
        let bound = self
            .bound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        match bound {
            Some(listener) => Ok(listener),
            None => Ok(TcpListener::bind(self.ctx.config.bind_addr).await?),
        }
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        tracing::info!(addr = %listener.local_addr()?, "Relay server listening");
        self.accept_loop(&listener).await
    }

    /// Serve connections from an already bound listener until `shutdown` resolves
    ///
    /// On shutdown every registered channel is asked to close.
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tracing::info!(addr = %listener.local_addr()?, "Relay server listening");

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        };

        self.close_all().await;
        result
    }

    /// Ask every registered connection to close
    pub async fn close_all(&self) {
        let mut channels = self.ctx.registry.snapshot_viewers().await;
        if let Some(producer) = self.ctx.registry.producer().await {
            channels.push(producer);
        }

        for channel in &channels {
            channel.close();
        }

        tracing::debug!(count = channels.len(), "Closed all connections");
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    // Usually fd exhaustion; back off instead of spinning
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    self.ctx.stats.connection_rejected();
                    return;
                }
            }
        } else {
            None
        };

        let id = ChannelId(self.next_channel_id.fetch_add(1, Ordering::Relaxed));

        tracing::debug!(channel_id = %id, peer = %peer_addr, "New connection");

        if self.ctx.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::warn!(channel_id = %id, error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let ctx = Arc::clone(&self.ctx);

        tokio::spawn(async move {
            let _permit = permit;
            let connection = Connection::new(id, peer_addr, ctx);

            if let Err(e) = connection.run(socket).await {
                tracing::debug!(channel_id = %id, error = %e, "Connection error");
            }

            tracing::debug!(channel_id = %id, "Connection closed");
        });
    }
}
