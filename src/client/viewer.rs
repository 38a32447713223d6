//! Relay frame viewer
//!
//! Receives relayed frames and keeps reconnecting when the relay connection
//! drops, the way the browser viewer does.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::channel::FramePayload;

use super::config::ClientConfig;

/// Events from the frame viewer
#[derive(Debug)]
pub enum ViewerEvent {
    /// WebSocket connection established
    Connected,

    /// Frame received, verbatim
    Frame(FramePayload),

    /// Connection lost
    Disconnected,

    /// Waiting before the next connection attempt
    Reconnecting { attempt: u32, delay: Duration },

    /// Reconnect attempts exhausted, the viewer stopped
    GaveUp { attempts: u32 },
}

enum SessionEnd {
    /// Was connected, then the connection ended
    Dropped,
    /// Could not connect
    Failed,
    /// Nobody listens for events anymore
    ReceiverGone,
}

/// Background viewer task
///
/// Dropping the event receiver also stops the task.
pub struct FrameViewer {
    task: JoinHandle<()>,
    stop: Arc<Notify>,
}

impl FrameViewer {
    /// Start a viewer connected to `config.url`
    pub fn spawn(config: ClientConfig) -> (Self, mpsc::Receiver<ViewerEvent>) {
        let (tx, rx) = mpsc::channel(config.event_buffer.max(1));
        let stop = Arc::new(Notify::new());

        let task = tokio::spawn(run(config, tx, Arc::clone(&stop)));

        (Self { task, stop }, rx)
    }

    /// Stop the viewer
    pub fn stop(&self) {
        self.stop.notify_one();
    }

    /// Check if the viewer task has ended
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the viewer task to end
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

async fn run(config: ClientConfig, tx: mpsc::Sender<ViewerEvent>, stop: Arc<Notify>) {
    let mut attempt: u32 = 0;

    loop {
        let end = tokio::select! {
            _ = stop.notified() => return,
            end = watch(&config, &tx) => end,
        };

        match end {
            SessionEnd::ReceiverGone => return,
            SessionEnd::Dropped => attempt = 0,
            SessionEnd::Failed => {}
        }

        attempt += 1;
        if let Some(max) = config.max_reconnect_attempts {
            if attempt > max {
                tracing::warn!(url = %config.url, attempts = max, "Viewer giving up");
                let _ = tx.send(ViewerEvent::GaveUp { attempts: max }).await;
                return;
            }
        }

        let delay = config.reconnect_delay;
        if tx.send(ViewerEvent::Reconnecting { attempt, delay }).await.is_err() {
            return;
        }

        tokio::select! {
            _ = stop.notified() => return,
            _ = time::sleep(delay) => {}
        }
    }
}

async fn watch(config: &ClientConfig, tx: &mpsc::Sender<ViewerEvent>) -> SessionEnd {
    let mut ws = match time::timeout(config.connect_timeout, connect_async(config.url.as_str())).await
    {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(e)) => {
            tracing::debug!(url = %config.url, error = %e, "Viewer connect failed");
            return SessionEnd::Failed;
        }
        Err(_) => {
            tracing::debug!(url = %config.url, "Viewer connect timed out");
            return SessionEnd::Failed;
        }
    };

    if tx.send(ViewerEvent::Connected).await.is_err() {
        return SessionEnd::ReceiverGone;
    }

    while let Some(message) = ws.next().await {
        match message {
            Ok(Message::Close(_)) => break,
            Ok(other) => {
                if let Some(payload) = FramePayload::from_message(other) {
                    if tx.send(ViewerEvent::Frame(payload)).await.is_err() {
                        return SessionEnd::ReceiverGone;
                    }
                }
            }
            Err(e) => {
                tracing::debug!(url = %config.url, error = %e, "Viewer connection error");
                break;
            }
        }
    }

    if tx.send(ViewerEvent::Disconnected).await.is_err() {
        return SessionEnd::ReceiverGone;
    }

    SessionEnd::Dropped
}
