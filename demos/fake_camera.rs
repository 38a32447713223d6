//! Simulated camera producer
//!
//! Run with: cargo run --example fake_camera [RELAY_URL]
//!
//! Connects to the relay (default ws://127.0.0.1:3000), identifies as the
//! producer and sends a JSON frame envelope ten times a second. The browser
//! viewer renders `image` as an `<img>` source.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use frame_relay::client::{ClientConfig, FramePublisher, PublishEvent};
use tracing_subscriber::EnvFilter;

// 1x1 grey JPEG
const PLACEHOLDER_JPEG_B64: &str = "/9j/4AAQSkZJRgABAQEASABIAAD/2wBDAP//////////////////////////////////////////////////////////////////////////////////////wgALCAABAAEBAREA/8QAFBABAAAAAAAAAAAAAAAAAAAAAP/aAAgBAQABPxA=";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:3000".to_string());

    let (mut publisher, mut events) = FramePublisher::new(ClientConfig::new(url));

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                PublishEvent::Error(e) => tracing::warn!(error = %e, "Publisher error"),
                other => tracing::info!(event = ?other, "Publisher event"),
            }
        }
    });

    publisher.connect().await?;

    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    loop {
        ticker.tick().await;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let frame = serde_json::json!({
            "image": format!("data:image/jpeg;base64,{}", PLACEHOLDER_JPEG_B64),
            "timestamp": timestamp,
        });

        if let Err(e) = publisher.send_frame(frame.to_string()).await {
            tracing::error!(error = %e, "Relay connection lost");
            break;
        }
    }

    Ok(())
}
