//! End-to-end WebSocket and HTTP boundary tests over a real socket.

use futures::{SinkExt, Stream, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use vidscribe::config::{Config, TenantResolver};
use vidscribe::server::{build_router, build_state};

struct TestServer {
    addr: SocketAddr,
    _storage: TempDir,
    _buckets: TempDir,
    handle: tokio::task::JoinHandle<()>,
}

async fn start_server() -> TestServer {
    let storage = TempDir::new().unwrap();
    let buckets = TempDir::new().unwrap();

    let mut config = Config::default();
    config.openai_api_key = Some("test-key".to_string());
    // Unroutable engine: these tests never reach it.
    config.engine_base_url = "http://127.0.0.1:1".to_string();
    config.storage_dir = storage.path().to_path_buf();
    config.bucket_root = buckets.path().to_path_buf();

    let state = build_state(&config, Arc::new(TenantResolver::default())).unwrap();
    let router = build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server run");
    });

    TestServer {
        addr,
        _storage: storage,
        _buckets: buckets,
        handle,
    }
}

async fn next_json(
    socket: &mut (impl Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
) -> Value {
    loop {
        let message = socket
            .next()
            .await
            .expect("socket closed early")
            .expect("transport error");
        if let Message::Text(raw) = message {
            return serde_json::from_str(&raw).expect("valid event JSON");
        }
    }
}

#[tokio::test]
async fn test_unknown_service_type_fails_message_not_connection() {
    let server = start_server().await;
    let url = format!("ws://{}/ws/client-a", server.addr);
    let (mut socket, _) = connect_async(url).await.expect("connect");

    socket
        .send(Message::Text(
            r#"{"service_type": "telepathy", "type": "hello"}"#.to_string().into(),
        ))
        .await
        .expect("send");

    let event = next_json(&mut socket).await;
    assert_eq!(event["type"], "error");
    assert_eq!(event["service_type"], "telepathy");
    assert_eq!(event["client_id"], "client-a");
    assert!(event["timestamp"].as_f64().unwrap() > 0.0);

    // The connection is still usable after the error.
    socket
        .send(Message::Text(
            r#"{"service_type": "ai_chat", "type": "connect", "data": {"voice_replies": false}}"#
                .to_string()
                .into(),
        ))
        .await
        .expect("send");
    let event = next_json(&mut socket).await;
    assert_eq!(event["type"], "connect_ack");

    server.handle.abort();
}

#[tokio::test]
async fn test_assistant_session_flow_over_socket() {
    let server = start_server().await;
    let url = format!("ws://{}/ws/client-b", server.addr);
    let (mut socket, _) = connect_async(url).await.expect("connect");

    socket
        .send(Message::Text(
            r#"{"service_type": "ai_chat", "type": "speech_start"}"#.to_string().into(),
        ))
        .await
        .expect("send");
    let event = next_json(&mut socket).await;
    assert_eq!(event["type"], "speech_start_ack");
    assert_eq!(event["data"]["status"], "listening");

    socket
        .send(Message::Text(
            r#"{"service_type": "ai_chat", "type": "interrupt"}"#.to_string().into(),
        ))
        .await
        .expect("send");
    let event = next_json(&mut socket).await;
    assert_eq!(event["type"], "interrupt_ack");
    assert_eq!(event["service_type"], "ai_chat");

    // Unknown message type inside a known service is a single error event.
    socket
        .send(Message::Text(
            r#"{"service_type": "ai_chat", "type": "warp"}"#.to_string().into(),
        ))
        .await
        .expect("send");
    let event = next_json(&mut socket).await;
    assert_eq!(event["type"], "error");

    server.handle.abort();
}

#[tokio::test]
async fn test_malformed_frame_yields_error_event() {
    let server = start_server().await;
    let url = format!("ws://{}/ws/client-c", server.addr);
    let (mut socket, _) = connect_async(url).await.expect("connect");

    socket
        .send(Message::Text("{definitely not json".to_string().into()))
        .await
        .expect("send");
    let event = next_json(&mut socket).await;
    assert_eq!(event["type"], "error");

    server.handle.abort();
}

#[tokio::test]
async fn test_health_and_services_endpoints() {
    let server = start_server().await;
    let base = format!("http://{}", server.addr);
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base}/api/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["supported_services"], 1);

    let services: Value = client
        .get(format!("{base}/api/services"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(services["services"][0]["type"], "ai_chat");

    server.handle.abort();
}

#[tokio::test]
async fn test_storage_secure_rejects_bad_token() {
    let server = start_server().await;
    let base = format!("http://{}", server.addr);

    let response = reqwest::get(format!("{base}/api/storage-secure/bogus-token"))
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid token");

    server.handle.abort();
}

#[tokio::test]
async fn test_transcribe_endpoint_returns_structured_error() {
    let server = start_server().await;
    let base = format!("http://{}", server.addr);

    // The key does not exist in the (empty) store: the boundary converts
    // the pipeline failure into an error-shaped body, not a 5xx.
    let response = reqwest::Client::new()
        .post(format!("{base}/api/transcribe"))
        .json(&serde_json::json!({
            "bucket": "media",
            "target": "missing/video.mp4"
        }))
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("media/missing/video.mp4"));

    server.handle.abort();
}
