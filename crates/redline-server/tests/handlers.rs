#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use bytes::Bytes;
use futures_util::stream;
use http_body_util::BodyExt;
use tower::ServiceExt;

use redline_server::app_state::AppState;
use redline_server::config::ServerOptions;
use redline_server::middleware::MAX_BODY_BYTES;
use redline_server::router::build_app_router;

fn app() -> (AppState, Router) {
    let state = AppState::default();
    let opts = ServerOptions::new("127.0.0.1", 8080).unwrap();
    let router = build_app_router(state.clone(), &opts);
    (state, router)
}

async fn call(router: &Router, req: Request<Body>) -> (StatusCode, String) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn post_message(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/message")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

#[tokio::test]
async fn hello_returns_greeting() {
    let (_, router) = app();
    let req = Request::get("/hello").body(Body::empty()).unwrap();
    let (status, body) = call(&router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Hello, World!\n");
}

#[tokio::test]
async fn repeat_echoes_message() {
    let (_, router) = app();
    let (status, body) = call(&router, post_message(r#"{"type":"repeat","msg":"hi"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "{\"type\":\"repeat\",\"msg\":\"hi\"}\n");
}

#[tokio::test]
async fn repeat_ignores_extra_fields_and_keeps_long_messages() {
    let (_, router) = app();
    let long = "x".repeat(10_000);
    let req = post_message(format!(r#"{{"type":"repeat","msg":"{long}","extra":[1,2,3]}}"#));
    let (status, body) = call(&router, req).await;
    assert_eq!(status, StatusCode::OK);

    let v: serde_json::Value = serde_json::from_str(body.trim_end()).unwrap();
    assert_eq!(v["type"], "repeat");
    assert_eq!(v["msg"].as_str().unwrap().len(), 10_000);
    assert!(v.get("extra").is_none());
}

#[tokio::test]
async fn time_is_rfc3339_utc() {
    let (_, router) = app();
    let (status, body) = call(&router, post_message(r#"{"type":"time"}"#)).await;
    assert_eq!(status, StatusCode::OK);

    let v: serde_json::Value = serde_json::from_str(body.trim_end()).unwrap();
    assert_eq!(v["type"], "time");
    let t = v["time"].as_str().unwrap();
    assert!(t.ends_with('Z'), "{t}");
    assert!(chrono::DateTime::parse_from_rfc3339(t).is_ok(), "{t}");
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let (_, router) = app();
    let (status, body) = call(&router, post_message(r#"{"type":"repeat""#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "invalid JSON\n");
}

#[tokio::test]
async fn unknown_type_is_bad_request() {
    let (_, router) = app();
    let (status, body) = call(&router, post_message(r#"{"type":"shout","msg":"hi"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "unknown type\n");
}

#[tokio::test]
async fn repeated_requests_get_identical_replies() {
    let (_, router) = app();
    let first = call(&router, post_message(r#"{"type":"repeat","msg":"same"}"#)).await;
    let second = call(&router, post_message(r#"{"type":"repeat","msg":"same"}"#)).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn wrong_method_is_not_allowed() {
    let (_, router) = app();
    let req = Request::get("/api/message").body(Body::empty()).unwrap();
    let (status, _) = call(&router, req).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn unknown_path_is_not_found_and_not_counted() {
    let (state, router) = app();
    let req = Request::get("/nope").body(Body::empty()).unwrap();
    let (status, _) = call(&router, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(state.metrics().requests_total.get(&["GET", "/nope", "404"]), 0);
    let text = state.metrics().render(redline_server::obs::ExpositionFormat::Prometheus);
    assert!(!text.contains("/nope"));
}

#[tokio::test]
async fn rejected_messages_are_counted_with_their_status() {
    let (state, router) = app();
    let _ = call(&router, post_message("not json")).await;
    assert_eq!(
        state.metrics().requests_total.get(&["POST", "/api/message", "400"]),
        1
    );
}

/// Streams `chunks` x 64 KiB and records how many bytes were pulled.
fn counted_body(chunks: usize, pulled: Arc<AtomicUsize>) -> Body {
    let chunk = Bytes::from(vec![b'a'; 64 * 1024]);
    let frames = stream::iter((0..chunks).map(move |_| {
        pulled.fetch_add(chunk.len(), Ordering::SeqCst);
        Ok::<_, std::io::Error>(chunk.clone())
    }));
    Body::from_stream(frames)
}

#[tokio::test]
async fn oversized_body_is_rejected_with_413() {
    let (state, router) = app();
    let pulled = Arc::new(AtomicUsize::new(0));
    let chunks = MAX_BODY_BYTES / (64 * 1024) * 4;
    let (status, _) = call(&router, post_message(counted_body(chunks, Arc::clone(&pulled)))).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(pulled.load(Ordering::SeqCst) <= MAX_BODY_BYTES + 64 * 1024);
    assert_eq!(state.metrics().requests_total.get(&["POST", "/api/message", "200"]), 0);
}

#[tokio::test]
async fn unknown_path_body_is_never_read() {
    let (_, router) = app();
    let pulled = Arc::new(AtomicUsize::new(0));
    let req = Request::builder()
        .method(Method::POST)
        .uri("/nope")
        .body(counted_body(16, Arc::clone(&pulled)))
        .unwrap();
    let (status, _) = call(&router, req).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(pulled.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stalled_body_hits_read_timeout() {
    let state = AppState::default();
    let opts = ServerOptions::new("127.0.0.1", 8080)
        .unwrap()
        .with_read_timeout(Duration::from_millis(50));
    let router = build_app_router(state, &opts);

    let stalled = Body::from_stream(stream::pending::<Result<Bytes, std::io::Error>>());
    let (status, body) = call(&router, post_message(stalled)).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(body, "Request Timeout\n");
}
