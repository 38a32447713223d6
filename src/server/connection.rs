//! Per-connection relay state machine
//!
//! ```text
//! Connecting ──upgrade──► Open (implicit viewer)
//!                           │ first data message
//!                           ▼
//!               classify ─┬─► Producer: frames ──► Broadcaster
//!                         └─► Viewer:   messages ignored
//!                           │ close / error / idle
//!                           ▼
//!                        Closed (unregistered)
//! ```

use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use crate::channel::{Channel, ChannelId, Frame, FramePayload, Outbox, Outgoing};
use crate::error::{Error, Result};
use crate::registry::{ChannelRegistry, RegistryError, Role};
use crate::relay::{Broadcaster, RoleClassifier};
use crate::server::config::ServerConfig;
use crate::session::SessionState;
use crate::stats::RelayStats;

/// Everything a connection task needs from the server
pub(crate) struct RelayContext {
    pub config: ServerConfig,
    pub registry: Arc<ChannelRegistry>,
    pub broadcaster: Broadcaster,
    pub classifier: RoleClassifier,
    pub stats: Arc<RelayStats>,
}

pub(crate) struct Connection {
    session: SessionState,
    ctx: Arc<RelayContext>,
}

impl Connection {
    pub fn new(id: ChannelId, peer_addr: SocketAddr, ctx: Arc<RelayContext>) -> Self {
        Self {
            session: SessionState::new(id, peer_addr),
            ctx,
        }
    }

    /// Upgrade the socket and serve it until it closes
    pub async fn run(mut self, socket: TcpStream) -> Result<()> {
        let ws = time::timeout(self.ctx.config.handshake_timeout, accept_async(socket))
            .await
            .map_err(|_| Error::HandshakeTimeout)??;

        let (channel, outbox) = Channel::new(
            self.session.id,
            Some(self.session.peer_addr),
            self.ctx.config.viewer_queue_depth,
        );
        channel.mark_open();
        self.ctx.stats.connection_opened();

        // Until it identifies itself, every connection is a viewer
        self.ctx.registry.register_viewer(channel.clone()).await;

        tracing::debug!(
            channel_id = %channel.id(),
            peer = %self.session.peer_addr,
            "WebSocket connection established"
        );

        let result = self.event_loop(ws, &channel, outbox).await;

        channel.mark_closed();
        let stats = self.session.stats_snapshot();

        match self.ctx.registry.unregister(channel.id()).await {
            Some(Role::Producer) => tracing::info!(
                channel_id = %channel.id(),
                frames = stats.messages_received,
                duration_secs = stats.duration.as_secs(),
                "Producer disconnected"
            ),
            Some(_) => tracing::debug!(
                channel_id = %channel.id(),
                frames_sent = stats.messages_sent,
                "Viewer disconnected"
            ),
            None => tracing::debug!(
                channel_id = %channel.id(),
                role = %self.session.role(),
                "Unregistered connection closed"
            ),
        }

        self.ctx.stats.connection_closed();
        result
    }

    async fn event_loop(
        &mut self,
        ws: WebSocketStream<TcpStream>,
        channel: &Channel,
        mut outbox: Outbox,
    ) -> Result<()> {
        let (mut sink, mut stream) = ws.split();

        let mut heartbeat = self.ctx.config.heartbeat_interval.map(|period| {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let mut last_inbound = Instant::now();

        loop {
            tokio::select! {
                inbound = stream.next() => match inbound {
                    Some(Ok(message)) => {
                        last_inbound = Instant::now();
                        if self.on_message(message, channel).await.is_break() {
                            break;
                        }
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                },

                outgoing = outbox.next() => match outgoing {
                    Outgoing::Frame(frame) => {
                        sink.send(frame.payload.to_message()).await?;
                        self.session.stats.record_sent(frame.len());
                    }
                    Outgoing::Close => {
                        tracing::debug!(channel_id = %channel.id(), "Closing connection on request");
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                },

                _ = next_tick(&mut heartbeat) => {
                    if let Some(idle_timeout) = self.ctx.config.idle_timeout {
                        if last_inbound.elapsed() > idle_timeout {
                            tracing::warn!(
                                channel_id = %channel.id(),
                                idle_secs = last_inbound.elapsed().as_secs(),
                                "Connection idle, closing"
                            );
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    }

                    sink.send(Message::Ping(Vec::new())).await?;
                }
            }
        }

        let _ = sink.close().await;
        Ok(())
    }

    async fn on_message(&mut self, message: Message, channel: &Channel) -> ControlFlow<()> {
        let payload = match message {
            Message::Close(frame) => {
                tracing::debug!(channel_id = %channel.id(), frame = ?frame, "Close frame received");
                return ControlFlow::Break(());
            }
            // Pings are answered by tungstenite on the next flush
            other => match FramePayload::from_message(other) {
                Some(payload) => payload,
                None => return ControlFlow::Continue(()),
            },
        };

        self.session.stats.record_received(payload.len());

        match self.session.role() {
            Role::Unclassified => self.classify(payload, channel).await,
            Role::Producer => self.forward(payload, channel).await,
            Role::Viewer => {
                tracing::trace!(channel_id = %channel.id(), "Ignoring message from viewer");
            }
        }

        ControlFlow::Continue(())
    }

    async fn classify(&mut self, first_message: FramePayload, channel: &Channel) {
        let role = self.ctx.classifier.classify(&first_message);
        self.session.assign_role(role);

        match role {
            Role::Producer => {
                if let Err(RegistryError::ProducerConflict { displaced }) =
                    self.ctx.registry.promote_to_producer(channel.clone()).await
                {
                    if self.ctx.config.close_displaced_producer {
                        tracing::info!(displaced = %displaced.id(), "Closing displaced producer");
                        displaced.close();
                    }
                }
                self.ctx.stats.producer_registered();
            }
            Role::Viewer | Role::Unclassified => {
                self.ctx.registry.register_viewer(channel.clone()).await;
                tracing::debug!(channel_id = %channel.id(), "Connection classified as viewer");
            }
        }
    }

    async fn forward(&mut self, payload: FramePayload, channel: &Channel) {
        if !self.ctx.registry.is_producer(channel.id()).await {
            self.ctx.stats.frame_ignored();
            tracing::debug!(channel_id = %channel.id(), "Ignoring frame from displaced producer");
            return;
        }

        let frame = Frame::new(self.session.next_sequence(), payload);
        self.ctx.stats.frame_received();

        let report = self.ctx.broadcaster.broadcast(&frame).await;

        tracing::trace!(
            sequence = frame.sequence,
            bytes = frame.len(),
            delivered = report.delivered,
            skipped = report.skipped,
            dropped = report.dropped,
            replaced = report.replaced,
            "Frame relayed"
        );
    }
}

async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
