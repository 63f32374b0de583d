// End-to-end tests over real transports: a local WebSocket server for the
// live path and a mock HTTP server for the polling fallback.

use futures::{SinkExt, StreamExt};
use livefeed::cache::{new_region_cache, DEFAULT_TTL};
use livefeed::{ConnectionState, FeedConfig, LiveFeed, Region};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};

const WAIT: Duration = Duration::from_secs(5);

fn dead_port_url(scheme: &str) -> String {
    // Bind then drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("{}://{}", scheme, addr)
}

#[tokio::test]
async fn test_live_socket_delivers_batch() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let mut frames = Vec::new();
        while frames.len() < 2 {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    frames.push(serde_json::from_str::<Value>(&text).unwrap())
                }
                Some(Ok(_)) => continue,
                _ => break,
            }
        }

        let update = json!({
            "type": "vessel_update",
            "vessels": [
                {"id": 1001, "latitude": 26.5, "longitude": 56.2, "type": "tanker"},
                {"id": "1002", "latitude": "26.7", "longitude": "56.4", "vesselType": "lng_carrier"}
            ],
            "timestamp": "2026-02-01T08:30:00Z",
            "totalCount": 2,
            "totalPages": 1,
            "currentPage": 1,
            "pageSize": 500
        });
        ws.send(Message::Text(update.to_string())).await.unwrap();

        // Hold the connection until the client closes it
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
        frames
    });

    let mut config = FeedConfig::default();
    config.socket.url = format!("ws://{}", addr);
    config.polling.base_url = dead_port_url("http");

    let feed = LiveFeed::connect(&config, new_region_cache(DEFAULT_TTL)).unwrap();
    let mut rx = feed.watch();
    timeout(WAIT, rx.wait_for(|s| s.entities.len() == 2))
        .await
        .expect("timed out waiting for live batch")
        .unwrap();

    let state = feed.state();
    assert_eq!(state.connection, ConnectionState::Connected);
    assert_eq!(state.entities[0].id, "1001");
    assert_eq!(state.positioned().count(), 2);
    assert_eq!(state.category_counts().get("lng_carrier"), Some(&1));

    feed.shutdown().await;

    let frames = timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(
        frames,
        vec![
            json!({"type": "subscribe_region", "region": "global"}),
            json!({"type": "request_vessels", "allVessels": false, "page": 1, "pageSize": 500}),
        ]
    );
}

#[tokio::test]
async fn test_unreachable_socket_falls_back_to_polling() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/vessels/polling?region=north_sea&page=1&pageSize=500")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "vessels": [
                    {"id": "ns-1", "latitude": 57.1, "longitude": 2.3, "type": "tanker"},
                    {"id": "ns-2", "latitude": 58.0, "longitude": 1.9}
                ],
                "totalCount": 2,
                "totalPages": 1,
                "currentPage": 1,
                "pageSize": 500
            })
            .to_string(),
        )
        .create_async()
        .await;

    let mut config = FeedConfig::default();
    config.feed.region = "north_sea".to_string();
    config.socket.url = dead_port_url("ws");
    config.polling.base_url = server.url();

    let cache = new_region_cache(DEFAULT_TTL);
    let feed = LiveFeed::connect(&config, cache.clone()).unwrap();
    let mut rx = feed.watch();
    timeout(WAIT, rx.wait_for(|s| s.entities.len() == 2))
        .await
        .expect("timed out waiting for polled batch")
        .unwrap();

    let state = feed.state();
    assert_eq!(state.connection, ConnectionState::PollingFallback);
    assert!(state.error.is_none());
    let region = Region::parse("north_sea").unwrap();
    assert_eq!(cache.get(&region).unwrap().len(), 2);
    mock.assert_async().await;

    feed.shutdown().await;
}

#[tokio::test]
async fn test_invalid_region_is_rejected() {
    let mut config = FeedConfig::default();
    config.feed.region = "North Sea!".to_string();

    let err = LiveFeed::connect(&config, new_region_cache(DEFAULT_TTL))
        .err()
        .unwrap();
    assert!(err.to_string().contains("Invalid region"));
}
