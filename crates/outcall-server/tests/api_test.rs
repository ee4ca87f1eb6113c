//! Control-plane HTTP integration tests driven through the router.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{initiate_body, test_state, TEST_SECRET};
use outcall_server::app;
use serde_json::Value;
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_status_and_uptime() {
    let app = app(test_state(false));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["activeCalls"], 0);
    assert!(json["uptimeSeconds"].is_number());
}

#[tokio::test]
async fn initiate_without_bearer_is_unauthorized() {
    let app = app(test_state(false));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/call/initiate")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(initiate_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert!(json["error"].is_string(), "401 must carry the error envelope");
}

#[tokio::test]
async fn initiate_with_wrong_bearer_is_unauthorized() {
    let app = app(test_state(false));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/call/initiate")
                .header(header::AUTHORIZATION, "Bearer wrong-secret")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(initiate_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert!(json["error"].is_string(), "401 must carry the error envelope");
}

#[tokio::test]
async fn initiate_missing_required_field_is_bad_request() {
    let app = app(test_state(false));
    let mut body = initiate_body();
    body["company"] = Value::String(String::new());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/call/initiate")
                .header(header::AUTHORIZATION, format!("Bearer {TEST_SECRET}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("company"));
}

#[tokio::test]
async fn initiate_returns_session_and_call_handle() {
    let state = test_state(false);
    let registry = state.registry.clone();
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/call/initiate")
                .header(header::AUTHORIZATION, format!("Bearer {TEST_SECRET}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(initiate_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["callSid"], "CA123");
    assert_eq!(json["status"], "initiating");
    let session_id = json["sessionId"].as_str().unwrap();
    assert!(registry.get(session_id).await.is_some());
}

#[tokio::test]
async fn failed_placement_returns_upstream_error_and_releases_session() {
    let state = test_state(true);
    let registry = state.registry.clone();
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/call/initiate")
                .header(header::AUTHORIZATION, format!("Bearer {TEST_SECRET}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(initiate_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("placement"));
    assert_eq!(registry.active_count().await, 0);
}

#[tokio::test]
async fn answer_webhook_for_unknown_session_speaks_an_error() {
    let app = app(test_state(false));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/call/webhook/not-a-session")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("CallSid=CA123"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let xml = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(xml.contains("<Say>"));
    assert!(xml.contains("<Hangup/>"));
    assert!(!xml.contains("<Stream"));
}

#[tokio::test]
async fn answer_webhook_opens_media_stream_for_known_session() {
    let state = test_state(false);
    let registry = state.registry.clone();
    let app = app(state.clone());

    // Initiate to create a session.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/call/initiate")
                .header(header::AUTHORIZATION, format!("Bearer {TEST_SECRET}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(initiate_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let session_id = body_json(response).await["sessionId"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(registry.get(&session_id).await.is_some());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/call/webhook/{session_id}"))
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("CallSid=CA123"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("application/xml"));
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let xml = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(xml.contains(&format!("wss://test.example.com/call/media/{session_id}")));
    assert!(xml.contains("<Pause"));
}

#[tokio::test]
async fn status_callback_unknown_session_is_not_found() {
    let app = app(test_state(false));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/call/status/nope")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("CallStatus=completed&CallDuration=12"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn terminal_status_callback_marks_the_session() {
    let state = test_state(false);
    let registry = state.registry.clone();
    let app = app(state);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/call/initiate")
                .header(header::AUTHORIZATION, format!("Bearer {TEST_SECRET}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(initiate_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let session_id = body_json(response).await["sessionId"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/call/status/{session_id}"))
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("CallStatus=completed&CallDuration=37"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The orchestrator processes the event asynchronously.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let session = registry.get(&session_id).await.unwrap();
    let state = session.state.read().await;
    assert!(state.is_terminal());
    assert_eq!(state.duration_secs, 37);
    assert!(state.terminal_at.is_some());
}

#[tokio::test]
async fn session_snapshot_shape() {
    let state = test_state(false);
    let app = app(state);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/call/initiate")
                .header(header::AUTHORIZATION, format!("Bearer {TEST_SECRET}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(initiate_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let session_id = body_json(response).await["sessionId"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/call/session/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["sessionId"], session_id.as_str());
    assert_eq!(json["status"], "initiating");
    assert!(json["transcript"].is_array());
    assert!(json["analytics"].is_object());
    assert!(json["sentiment"]["score"].is_number());
}

#[tokio::test]
async fn session_snapshot_unknown_is_not_found() {
    let app = app(test_state(false));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/call/session/unknown")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn voice_preview_without_vendor_is_unavailable() {
    let app = app(test_state(false));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/voice/preview?index=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
