//! End-to-end relay tests over real sockets

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use frame_relay::client::{ClientConfig, FramePublisher, FrameViewer, PublishEvent, ViewerEvent};
use frame_relay::{FramePayload, RelayServer, ServerConfig};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn start_server(config: ServerConfig) -> (Arc<RelayServer>, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = Arc::new(RelayServer::new(config));
    let serving = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = serving.serve(listener).await;
    });

    (server, addr)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
    ws
}

/// Poll until `check` holds or the timeout expires
async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    time::timeout(TIMEOUT, async {
        while !check().await {
            time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Next data message, skipping pings
async fn next_data(ws: &mut Client) -> Message {
    time::timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(message)) => return message,
                other => panic!("connection ended: {:?}", other),
            }
        }
    })
    .await
    .expect("no message in time")
}

async fn assert_silent(ws: &mut Client, within: Duration) {
    let result = time::timeout(within, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_))) => continue,
                other => return other,
            }
        }
    })
    .await;
    assert!(result.is_err(), "unexpected message: {:?}", result);
}

fn test_config() -> ServerConfig {
    ServerConfig::default().disable_heartbeat()
}

#[tokio::test]
async fn test_frames_reach_registered_viewers_only() {
    let (server, addr) = start_server(test_config()).await;
    let registry = Arc::clone(server.registry());

    let mut producer = connect(addr).await;
    producer.send(Message::Text("raspberry-pi".into())).await.unwrap();
    wait_until(|| {
        let registry = Arc::clone(&registry);
        async move { registry.has_producer().await }
    })
    .await;

    let mut v1 = connect(addr).await;
    let mut v2 = connect(addr).await;
    wait_until(|| {
        let registry = Arc::clone(&registry);
        async move { registry.viewer_count().await == 2 }
    })
    .await;

    producer.send(Message::Text("frame-1".into())).await.unwrap();
    assert_eq!(next_data(&mut v1).await, Message::Text("frame-1".into()));
    assert_eq!(next_data(&mut v2).await, Message::Text("frame-1".into()));

    let mut v3 = connect(addr).await;
    wait_until(|| {
        let registry = Arc::clone(&registry);
        async move { registry.viewer_count().await == 3 }
    })
    .await;

    producer.send(Message::Text("frame-2".into())).await.unwrap();
    assert_eq!(next_data(&mut v3).await, Message::Text("frame-2".into()));
    assert_eq!(next_data(&mut v1).await, Message::Text("frame-2".into()));
    assert_eq!(next_data(&mut v2).await, Message::Text("frame-2".into()));

    let stats = server.stats().snapshot();
    assert_eq!(stats.frames_received, 2);
    assert_eq!(stats.producers_registered, 1);
}

#[tokio::test]
async fn test_binary_frames_forwarded_verbatim() {
    let (server, addr) = start_server(test_config()).await;
    let registry = Arc::clone(server.registry());

    let mut viewer = connect(addr).await;
    let mut producer = connect(addr).await;
    producer
        .send(Message::Text(r#"{"type":"raspberry-pi"}"#.into()))
        .await
        .unwrap();
    wait_until(|| {
        let registry = Arc::clone(&registry);
        async move { registry.has_producer().await && registry.viewer_count().await == 1 }
    })
    .await;

    let jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    producer.send(Message::Binary(jpeg.clone())).await.unwrap();

    assert_eq!(next_data(&mut viewer).await, Message::Binary(jpeg));
}

#[tokio::test]
async fn test_viewer_messages_are_ignored() {
    let (server, addr) = start_server(test_config()).await;
    let registry = Arc::clone(server.registry());

    let mut producer = connect(addr).await;
    producer.send(Message::Text("raspberry-pi".into())).await.unwrap();

    let mut chatty = connect(addr).await;
    let mut quiet = connect(addr).await;
    chatty.send(Message::Text("hello".into())).await.unwrap();
    // A later token must not turn a viewer into a producer
    chatty.send(Message::Text("raspberry-pi".into())).await.unwrap();

    wait_until(|| {
        let registry = Arc::clone(&registry);
        async move { registry.has_producer().await && registry.viewer_count().await == 2 }
    })
    .await;

    assert_silent(&mut quiet, Duration::from_millis(100)).await;
    assert_eq!(server.stats().snapshot().producers_registered, 1);
    assert_eq!(server.stats().snapshot().frames_received, 0);

    producer.send(Message::Text("frame".into())).await.unwrap();
    assert_eq!(next_data(&mut quiet).await, Message::Text("frame".into()));
    assert_eq!(next_data(&mut chatty).await, Message::Text("frame".into()));
}

#[tokio::test]
async fn test_producer_disconnect_clears_slot() {
    let (server, addr) = start_server(test_config()).await;
    let registry = Arc::clone(server.registry());

    let mut viewer = connect(addr).await;
    let mut producer = connect(addr).await;
    producer.send(Message::Text("raspberry-pi".into())).await.unwrap();
    wait_until(|| {
        let registry = Arc::clone(&registry);
        async move { registry.has_producer().await }
    })
    .await;

    producer.close(None).await.unwrap();
    drop(producer);

    wait_until(|| {
        let registry = Arc::clone(&registry);
        async move { !registry.has_producer().await }
    })
    .await;

    // Viewer stays connected and simply receives nothing
    assert_eq!(registry.viewer_count().await, 1);
    assert_silent(&mut viewer, Duration::from_millis(100)).await;

    // A new producer picks up where the old one left off
    let mut producer = connect(addr).await;
    producer.send(Message::Text("raspberry-pi".into())).await.unwrap();
    wait_until(|| {
        let registry = Arc::clone(&registry);
        async move { registry.has_producer().await }
    })
    .await;
    producer.send(Message::Text("after-reconnect".into())).await.unwrap();

    assert_eq!(
        next_data(&mut viewer).await,
        Message::Text("after-reconnect".into())
    );
}

#[tokio::test]
async fn test_displaced_producer_frames_ignored() {
    let (server, addr) = start_server(test_config()).await;
    let stats = Arc::clone(server.stats());

    let mut viewer = connect(addr).await;
    let mut first = connect(addr).await;
    first.send(Message::Text("raspberry-pi".into())).await.unwrap();
    let mut second = connect(addr).await;

    wait_until(|| {
        let stats = Arc::clone(&stats);
        async move { stats.snapshot().producers_registered == 1 }
    })
    .await;
    second.send(Message::Text("raspberry-pi".into())).await.unwrap();
    wait_until(|| {
        let stats = Arc::clone(&stats);
        async move { stats.snapshot().producers_registered == 2 }
    })
    .await;

    first.send(Message::Text("from-first".into())).await.unwrap();
    wait_until(|| {
        let stats = Arc::clone(&stats);
        async move { stats.snapshot().frames_ignored == 1 }
    })
    .await;
    second.send(Message::Text("from-second".into())).await.unwrap();

    assert_eq!(next_data(&mut viewer).await, Message::Text("from-second".into()));
    assert_silent(&mut viewer, Duration::from_millis(100)).await;

    // Left open by default
    assert_silent(&mut first, Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_displaced_producer_closed_when_configured() {
    let (server, addr) = start_server(test_config().close_displaced_producer(true)).await;
    let stats = Arc::clone(server.stats());

    let mut first = connect(addr).await;
    first.send(Message::Text("raspberry-pi".into())).await.unwrap();
    wait_until(|| {
        let stats = Arc::clone(&stats);
        async move { stats.snapshot().producers_registered == 1 }
    })
    .await;

    let mut second = connect(addr).await;
    second.send(Message::Text("raspberry-pi".into())).await.unwrap();

    let message = next_data(&mut first).await;
    assert!(matches!(message, Message::Close(_)), "got {:?}", message);
}

#[tokio::test]
async fn test_server_sends_heartbeat_pings() {
    let config = ServerConfig::default()
        .heartbeat_interval(Duration::from_millis(50))
        .idle_timeout(Duration::from_secs(10));
    let (_server, addr) = start_server(config).await;

    let mut client = connect(addr).await;
    let message = time::timeout(TIMEOUT, client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(matches!(message, Message::Ping(_)));
}

#[tokio::test]
async fn test_idle_connection_closed() {
    let config = ServerConfig::default()
        .heartbeat_interval(Duration::from_millis(30))
        .idle_timeout(Duration::from_millis(60));
    let (server, addr) = start_server(config).await;
    let registry = Arc::clone(server.registry());

    // Connect but never read, so pings go unanswered
    let _client = connect(addr).await;
    wait_until(|| {
        let registry = Arc::clone(&registry);
        async move { registry.viewer_count().await == 1 }
    })
    .await;

    wait_until(|| {
        let registry = Arc::clone(&registry);
        async move { registry.viewer_count().await == 0 }
    })
    .await;
}

#[tokio::test]
async fn test_connection_limit() {
    let (server, addr) = start_server(test_config().max_connections(1)).await;
    let stats = Arc::clone(server.stats());

    let _first = connect(addr).await;
    let second = connect_async(format!("ws://{}", addr)).await;

    assert!(second.is_err());
    wait_until(|| {
        let stats = Arc::clone(&stats);
        async move { stats.snapshot().connections_rejected == 1 }
    })
    .await;
}

#[tokio::test]
async fn test_serve_until_closes_connections() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(RelayServer::new(test_config()));
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let serving = Arc::clone(&server);
    let handle = tokio::spawn(async move {
        serving
            .serve_until(listener, async {
                let _ = stop_rx.await;
            })
            .await
    });

    let mut viewer = connect(addr).await;
    let registry = Arc::clone(server.registry());
    wait_until(|| {
        let registry = Arc::clone(&registry);
        async move { registry.viewer_count().await == 1 }
    })
    .await;

    stop_tx.send(()).unwrap();
    time::timeout(TIMEOUT, handle).await.unwrap().unwrap().unwrap();

    let message = next_data(&mut viewer).await;
    assert!(matches!(message, Message::Close(_)));
}

#[tokio::test]
async fn test_bound_server_runs_on_ephemeral_port() {
    let config = test_config().bind("127.0.0.1:0".parse().unwrap());
    let server = Arc::new(RelayServer::bind(config).await.unwrap());
    let addr = server.local_addr().unwrap();
    assert_ne!(addr.port(), 0);

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let serving = Arc::clone(&server);
    let handle = tokio::spawn(async move {
        serving
            .run_until(async {
                let _ = stop_rx.await;
            })
            .await
    });

    let mut viewer = connect(addr).await;
    let mut producer = connect(addr).await;
    producer
        .send(Message::Text("raspberry-pi".into()))
        .await
        .unwrap();

    let registry = Arc::clone(server.registry());
    wait_until(|| {
        let registry = Arc::clone(&registry);
        async move { registry.has_producer().await && registry.viewer_count().await == 1 }
    })
    .await;

    producer.send(Message::Text("frame".into())).await.unwrap();
    assert_eq!(next_data(&mut viewer).await, Message::Text("frame".into()));

    stop_tx.send(()).unwrap();
    time::timeout(TIMEOUT, handle).await.unwrap().unwrap().unwrap();
}

#[test]
fn test_unbound_server_has_no_local_addr() {
    let server = RelayServer::new(test_config());
    assert!(server.local_addr().is_none());
}

#[tokio::test]
async fn test_publisher_and_viewer_clients() {
    let (server, addr) = start_server(test_config()).await;
    let registry = Arc::clone(server.registry());
    let url = format!("ws://{}", addr);

    let (viewer, mut viewer_events) = FrameViewer::spawn(ClientConfig::new(url.clone()));
    assert!(matches!(
        time::timeout(TIMEOUT, viewer_events.recv()).await.unwrap(),
        Some(ViewerEvent::Connected)
    ));

    let (mut publisher, mut publish_events) = FramePublisher::new(ClientConfig::new(url));
    publisher.connect().await.unwrap();
    assert!(publisher.is_connected());
    assert!(matches!(publish_events.recv().await, Some(PublishEvent::Connected)));
    assert!(matches!(publish_events.recv().await, Some(PublishEvent::Identified)));

    wait_until(|| {
        let registry = Arc::clone(&registry);
        async move { registry.has_producer().await && registry.viewer_count().await == 1 }
    })
    .await;

    publisher.send_frame(vec![1u8, 2, 3]).await.unwrap();

    match time::timeout(TIMEOUT, viewer_events.recv()).await.unwrap() {
        Some(ViewerEvent::Frame(payload)) => {
            assert_eq!(payload, FramePayload::binary(vec![1u8, 2, 3]));
        }
        other => panic!("expected frame, got {:?}", other),
    }

    publisher.disconnect().await;
    assert!(!publisher.is_connected());
    viewer.stop();
    viewer.join().await;
}

#[tokio::test]
async fn test_viewer_reconnects_after_drop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Relay stand-in: first connection gets one frame then closes,
    // second connection gets another frame and stays open
    tokio::spawn(async move {
        for frame in ["a", "b"] {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            ws.send(Message::Text(frame.into())).await.unwrap();
            if frame == "a" {
                ws.close(None).await.unwrap();
                // Let the close handshake finish
                while let Some(Ok(_)) = ws.next().await {}
            } else {
                time::sleep(TIMEOUT).await;
            }
        }
    });

    let config = ClientConfig::new(format!("ws://{}", addr))
        .reconnect_delay(Duration::from_millis(20));
    let (viewer, mut events) = FrameViewer::spawn(config);

    let mut seen = Vec::new();
    while seen.len() < 6 {
        let event = time::timeout(TIMEOUT, events.recv()).await.unwrap().unwrap();
        seen.push(event);
    }

    assert!(matches!(seen[0], ViewerEvent::Connected));
    assert!(matches!(&seen[1], ViewerEvent::Frame(p) if p.as_text() == Some("a")));
    assert!(matches!(seen[2], ViewerEvent::Disconnected));
    assert!(matches!(seen[3], ViewerEvent::Reconnecting { attempt: 1, .. }));
    assert!(matches!(seen[4], ViewerEvent::Connected));
    assert!(matches!(&seen[5], ViewerEvent::Frame(p) if p.as_text() == Some("b")));

    viewer.stop();
    viewer.join().await;
}
