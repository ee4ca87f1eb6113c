//! WebSocket integration tests: observer snapshot/stream and the media
//! endpoint, against a real listener.

mod common;

use axum::http::header;
use common::{initiate_body, test_state, TEST_SECRET};
use futures_util::{SinkExt, StreamExt};
use outcall_server::{app, AppState};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

async fn serve(state: AppState) -> SocketAddr {
    let app = app(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

async fn initiate(addr: SocketAddr) -> String {
    let response = raw_post(
        addr,
        "/call/initiate",
        &initiate_body().to_string(),
        Some(TEST_SECRET),
    )
    .await;
    let json: Value = serde_json::from_str(&response).unwrap();
    json["sessionId"].as_str().unwrap().to_string()
}

/// Minimal HTTP client over a raw socket; avoids pulling an HTTP client
/// into dev-dependencies just for test setup.
async fn raw_post(
    addr: SocketAddr,
    path: &str,
    body: &str,
    bearer: Option<&str>,
) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let auth = bearer
        .map(|b| format!("{}: Bearer {b}\r\n", header::AUTHORIZATION))
        .unwrap_or_default();
    let request = format!(
        "POST {path} HTTP/1.1\r\nHost: {addr}\r\n{auth}Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_default()
}

#[tokio::test]
async fn observer_receives_snapshot_then_live_events() {
    let state = test_state(false);
    let relay = state.relay.clone();
    let addr = serve(state).await;
    let session_id = initiate(addr).await;

    let url = format!("ws://{addr}/call/transcript/{session_id}");
    let (mut ws, _) = connect_async(url).await.expect("observer connect failed");

    // Snapshot arrives first.
    let first = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out")
        .unwrap()
        .unwrap();
    let snapshot: Value = serde_json::from_str(first.to_text().unwrap()).unwrap();
    assert_eq!(snapshot["type"], "session_state");
    assert_eq!(snapshot["status"], "initiating");
    assert_eq!(snapshot["messageCount"], 0);

    // Live broadcasts follow in order.
    relay
        .broadcast(
            &session_id,
            &outcall_types::ObserverEvent::user_speech("hello there"),
        )
        .await;
    let second = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out")
        .unwrap()
        .unwrap();
    let event: Value = serde_json::from_str(second.to_text().unwrap()).unwrap();
    assert_eq!(event["type"], "user_speech");
    assert_eq!(event["text"], "hello there");
    assert_eq!(event["final"], true);
}

#[tokio::test]
async fn observer_for_unknown_session_is_rejected() {
    let addr = serve(test_state(false)).await;
    let url = format!("ws://{addr}/call/transcript/does-not-exist");
    assert!(connect_async(url).await.is_err());
}

#[tokio::test]
async fn observer_origin_filtering() {
    let mut state = test_state(false);
    {
        let config = std::sync::Arc::get_mut(&mut state.config).unwrap();
        config.observers.allowed_origins = vec!["https://ops.example.com".to_string()];
    }
    let addr = serve(state).await;

    // Any origin other than the allowed one is refused at upgrade time.
    let url = format!("ws://{addr}/call/transcript/whatever");
    let request = tokio_tungstenite::tungstenite::client::IntoClientRequest::into_client_request(
        url.as_str(),
    )
    .map(|mut request| {
        request
            .headers_mut()
            .insert("Origin", "https://evil.example.com".parse().unwrap());
        request
    })
    .unwrap();
    assert!(connect_async(request).await.is_err());
}

#[tokio::test]
async fn media_socket_drives_the_call() {
    let state = test_state(false);
    let registry = state.registry.clone();
    let addr = serve(state).await;
    let session_id = initiate(addr).await;

    let url = format!("ws://{addr}/call/media/{session_id}");
    let (mut ws, _) = connect_async(url).await.expect("media connect failed");

    ws.send(Message::Text(json!({"event": "connected"}).to_string().into()))
        .await
        .unwrap();
    ws.send(Message::Text(
        json!({"event": "start", "start": {"streamSid": "MZ9"}})
            .to_string()
            .into(),
    ))
    .await
    .unwrap();

    // The orchestrator schedules the opening ~800 ms out and streams it
    // back over this socket.
    let mut saw_media_frame = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_secs(10), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                let value: Value = serde_json::from_str(&text).unwrap();
                if value["event"] == "media" {
                    assert_eq!(value["streamSid"], "MZ9");
                    assert!(value["media"]["payload"].is_string());
                    saw_media_frame = true;
                    break;
                }
            }
            _ => break,
        }
    }
    assert!(saw_media_frame, "opening audio frames never arrived");

    let session = registry.get(&session_id).await.unwrap();
    {
        let state = session.state.read().await;
        assert_eq!(state.stream_sid.as_deref(), Some("MZ9"));
        assert!(state.flags.opening_sent);
        assert_eq!(state.history.len(), 1, "opening appended to history");
    }

    // Closing the media stream ends the call.
    ws.send(Message::Text(json!({"event": "stop"}).to_string().into()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(session.state.read().await.is_terminal());
}

#[tokio::test]
async fn media_socket_for_unknown_session_is_rejected() {
    let addr = serve(test_state(false)).await;
    let url = format!("ws://{addr}/call/media/nope");
    assert!(connect_async(url).await.is_err());
}
