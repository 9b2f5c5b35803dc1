//! Integration tests for the live pipeline.
//!
//! These tests run the complete pipeline against a scripted upstream feed on
//! a local TCP socket and real WebSocket subscribers:
//! - Feed lines → cache → filtered subscriber pushes
//! - Reconnect bound and credential rejection
//! - Seeding from a snapshot file while the feed is down
//!
//! Run with: `cargo test --test pipeline_integration`

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use flightstream::feed::{wait_for_state, FeedState};
use flightstream::flight::{FlightCache, JsonSnapshotStore, PositionUpdate, SnapshotSink};
use flightstream::{LivePipeline, PipelineConfig};

type Subscriber = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

// ============================================================================
// Helper Functions
// ============================================================================

/// Pipeline config pointing at a plaintext feed on localhost.
fn pipeline_config(feed_port: u16) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.feed.host = "127.0.0.1".to_string();
    config.feed.port = feed_port;
    config.feed.tls = false;
    config.feed.username = "ops".to_string();
    config.feed.password = "s3cret".to_string();
    config.feed.reconnect_delay = Duration::from_millis(10);
    config.feed.connect_timeout = Duration::from_secs(2);
    config.server.listen = SocketAddr::from(([127, 0, 0, 1], 0));
    config.broadcast.interval = Duration::from_millis(50);
    config
}

/// A port with nothing listening on it.
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Scripted upstream: accepts one connection, records the two handshake
/// lines, writes `script`, then holds the connection until the client leaves.
async fn scripted_feed(script: &'static [&'static str]) -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let mut handshake = Vec::new();
        for _ in 0..2 {
            handshake.push(lines.next_line().await.unwrap().unwrap());
        }
        for line in script {
            write_half.write_all(line.as_bytes()).await.unwrap();
            write_half.write_all(b"\n").await.unwrap();
        }
        while let Ok(Some(_)) = lines.next_line().await {}
        handshake
    });

    (port, handle)
}

async fn subscribe(addr: SocketAddr) -> Subscriber {
    let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
    ws
}

/// Read pushes until a `flights` message satisfies `accept`.
async fn wait_for_flights<F>(ws: &mut Subscriber, mut accept: F) -> Vec<Value>
where
    F: FnMut(&[Value]) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let message = tokio::time::timeout_at(deadline, ws.next())
            .await
            .expect("timed out waiting for flights")
            .expect("subscriber stream ended")
            .expect("subscriber read failed");
        let Message::Text(text) = message else {
            continue;
        };
        let json: Value = serde_json::from_str(&text).unwrap();
        if json["type"] != "flights" {
            continue;
        }
        let flights = json["flights"].as_array().unwrap().clone();
        if accept(&flights) {
            return flights;
        }
    }
}

fn ids(flights: &[Value]) -> Vec<&str> {
    flights.iter().map(|f| f["id"].as_str().unwrap()).collect()
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Feed lines flow through the cache to a subscriber with a cargo filter.
#[tokio::test]
async fn test_feed_to_filtered_subscriber_flow() {
    let (feed_port, feed) = scripted_feed(&[
        "auth ok",
        "pos a1 40.64 -73.78 3500 90 200 A 1700000000 none",
        "pos b2 33.94 -118.40 12000 270 320 A 1700000000 1200",
        "flight a1 FDX901 KMEM KJFK",
        "flight b2 DAL123 KLAX none",
        "pos X notanumber 10 20 30 T 123 none",
    ])
    .await;

    let pipeline = LivePipeline::builder(pipeline_config(feed_port))
        .start()
        .await
        .unwrap();

    let mut ws = subscribe(pipeline.local_addr()).await;
    ws.send(Message::Text(
        r#"{"type":"setFilter","filter":"cargo"}"#.to_string(),
    ))
    .await
    .unwrap();

    let flights = wait_for_flights(&mut ws, |flights| {
        flights.len() == 1 && flights[0]["callsign"] == "FDX901"
    })
    .await;

    assert_eq!(ids(&flights), vec!["a1"]);
    assert_eq!(flights[0]["departure"]["icao"], "KMEM");
    assert_eq!(flights[0]["arrival"]["icao"], "KJFK");
    assert_eq!(pipeline.cache().len(), 2);
    assert!(pipeline.cache().get("X").is_none());
    assert_eq!(
        pipeline.cache().get("b2").unwrap().squawk.as_deref(),
        Some("1200")
    );

    pipeline.shutdown().await;
    let handshake = feed.await.unwrap();
    assert_eq!(handshake, vec!["login ops s3cret", "subscribe events position,flight"]);
}

/// A subscriber using the default filter sees every flight.
#[tokio::test]
async fn test_default_filter_sees_everything() {
    let (feed_port, _feed) = scripted_feed(&[
        "pos a1 40.64 -73.78 3500 90 200 A 1700000000 none",
        "pos b2 33.94 -118.40 12000 270 320 A 1700000000 none",
    ])
    .await;

    let pipeline = LivePipeline::builder(pipeline_config(feed_port))
        .start()
        .await
        .unwrap();
    let mut ws = subscribe(pipeline.local_addr()).await;

    let flights = wait_for_flights(&mut ws, |flights| flights.len() == 2).await;
    assert_eq!(ids(&flights), vec!["a1", "b2"]);

    pipeline.shutdown().await;
}

/// An unreachable feed stops after five attempts; subscribers keep being
/// served.
#[tokio::test]
async fn test_unreachable_feed_gives_up_and_keeps_serving() {
    let pipeline = LivePipeline::builder(pipeline_config(closed_port().await))
        .start()
        .await
        .unwrap();

    let mut state = pipeline.feed_state();
    let reached = wait_for_state(&mut state, FeedState::GaveUp, Duration::from_secs(5)).await;
    assert_eq!(reached, Some(FeedState::GaveUp));

    let mut ws = subscribe(pipeline.local_addr()).await;
    ws.send(Message::Text(r#"{"type":"ping"}"#.to_string()))
        .await
        .unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let json: Value = serde_json::from_str(&text).unwrap();
                if json["type"] == "pong" {
                    return json;
                }
            }
        }
    })
    .await
    .expect("pong received");
    assert!(reply["timestamp"].is_i64());

    pipeline.shutdown().await;
}

/// Rejected credentials end ingestion without a second connection.
#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let feed_port = listener.local_addr().unwrap().port();
    let connections = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&connections);
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = stream.write_all(b"auth failed\n").await;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    });

    let pipeline = LivePipeline::builder(pipeline_config(feed_port))
        .start()
        .await
        .unwrap();

    let mut state = pipeline.feed_state();
    let reached = wait_for_state(&mut state, FeedState::Rejected, Duration::from_secs(5)).await;
    assert_eq!(reached, Some(FeedState::Rejected));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connections.load(Ordering::SeqCst), 1);

    pipeline.shutdown().await;
}

/// A snapshot file seeds the cache, and a new subscriber gets it at once.
#[tokio::test]
async fn test_snapshot_seeds_new_subscriber() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let snapshot_path = temp_dir.path().join("snapshot.json");

    let previous = FlightCache::default();
    previous.apply_position(PositionUpdate {
        id: "c3".to_string(),
        latitude: 51.47,
        longitude: -0.45,
        altitude_ft: 2000.0,
        heading_deg: 270.0,
        ground_speed_kt: 160.0,
        update_type: "A".to_string(),
        timestamp: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        squawk: None,
    });
    JsonSnapshotStore::new(&snapshot_path)
        .persist_snapshot(&previous.snapshot())
        .unwrap();

    let mut config = pipeline_config(closed_port().await);
    config.snapshot.path = Some(snapshot_path);
    config.broadcast.interval = Duration::from_secs(60);
    let pipeline = LivePipeline::builder(config).start().await.unwrap();
    assert!(pipeline.cache().get("c3").is_some());

    let mut ws = subscribe(pipeline.local_addr()).await;
    let flights = wait_for_flights(&mut ws, |flights| !flights.is_empty()).await;
    assert_eq!(ids(&flights), vec!["c3"]);

    pipeline.shutdown().await;
}

/// Published events reach every subscriber in the generic envelope.
#[tokio::test]
async fn test_published_event_envelope() {
    let pipeline = LivePipeline::builder(pipeline_config(closed_port().await))
        .start()
        .await
        .unwrap();
    let mut ws = subscribe(pipeline.local_addr()).await;

    let registry = Arc::clone(pipeline.registry());
    for _ in 0..100 {
        if !registry.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    registry
        .publish_event("weatherAlert", &serde_json::json!({"airport": "KORD"}))
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let json: Value = serde_json::from_str(&text).unwrap();
                if json["type"] == "weatherAlert" {
                    return json;
                }
            }
        }
    })
    .await
    .expect("event received");
    assert_eq!(event["data"]["airport"], "KORD");

    pipeline.shutdown().await;
}
