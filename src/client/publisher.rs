//! Relay frame publisher
//!
//! High-level API for the producer side: connect, identify, push frames.

use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::channel::FramePayload;
use crate::error::{Error, Result};

use super::config::ClientConfig;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Events from the frame publisher
#[derive(Debug)]
pub enum PublishEvent {
    /// WebSocket connection established
    Connected,

    /// Identification token sent, frames will be relayed
    Identified,

    /// Error occurred
    Error(String),

    /// Disconnected
    Disconnected,
}

/// Relay frame publisher
///
/// # Example
/// ```no_run
/// use frame_relay::client::{ClientConfig, FramePublisher};
///
/// # async fn example() -> frame_relay::Result<()> {
/// let config = ClientConfig::new("ws://localhost:3000");
/// let (mut publisher, mut events) = FramePublisher::new(config);
///
/// tokio::spawn(async move {
///     while let Some(event) = events.recv().await {
///         println!("Event: {:?}", event);
///     }
/// });
///
/// publisher.connect().await?;
/// publisher.send_frame(r#"{"image":"data:image/jpeg;base64,..."}"#).await?;
/// # Ok(())
/// # }
/// ```
pub struct FramePublisher {
    config: ClientConfig,
    event_tx: mpsc::Sender<PublishEvent>,
    sink: Option<WsSink>,
    reader: Option<JoinHandle<()>>,
}

impl FramePublisher {
    /// Create a new publisher.
    ///
    /// Returns the publisher and a receiver for events.
    pub fn new(config: ClientConfig) -> (Self, mpsc::Receiver<PublishEvent>) {
        let (tx, rx) = mpsc::channel(config.event_buffer.max(1));

        let publisher = Self {
            config,
            event_tx: tx,
            sink: None,
            reader: None,
        };

        (publisher, rx)
    }

    /// Connect to the relay and identify as the producer.
    pub async fn connect(&mut self) -> Result<()> {
        let (ws, _response) =
            time::timeout(self.config.connect_timeout, connect_async(self.config.url.as_str()))
                .await
                .map_err(|_| Error::HandshakeTimeout)??;
        let _ = self.event_tx.send(PublishEvent::Connected).await;

        let (mut sink, mut stream) = ws.split();
        sink.send(Message::Text(self.config.producer_token.clone()))
            .await?;
        let _ = self.event_tx.send(PublishEvent::Identified).await;

        // Keep reading so pings get answered and closes are noticed
        let event_tx = self.event_tx.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        let _ = event_tx.send(PublishEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }
            let _ = event_tx.send(PublishEvent::Disconnected).await;
        });

        self.sink = Some(sink);
        self.reader = Some(reader);
        Ok(())
    }

    /// Send one frame to the relay.
    ///
    /// Text payloads are sent as text messages, binary as binary.
    pub async fn send_frame(&mut self, payload: impl Into<FramePayload>) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(Error::ConnectionClosed)?;
        sink.send(payload.into().to_message()).await?;
        Ok(())
    }

    /// Disconnect from the relay.
    pub async fn disconnect(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            let _ = sink.close().await;
        }

        if let Some(mut reader) = self.reader.take() {
            if time::timeout(Duration::from_secs(1), &mut reader).await.is_err() {
                reader.abort();
                let _ = self.event_tx.send(PublishEvent::Disconnected).await;
            }
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        self.sink.is_some() && self.reader.as_ref().is_some_and(|r| !r.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let (mut publisher, _events) = FramePublisher::new(ClientConfig::new("ws://127.0.0.1:1"));

        assert!(!publisher.is_connected());
        let result = publisher.send_frame("frame").await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ClientConfig::new(format!("ws://{}", addr));
        let (mut publisher, _events) = FramePublisher::new(config);

        assert!(publisher.connect().await.is_err());
        assert!(!publisher.is_connected());
    }
}
