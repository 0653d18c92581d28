#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use redline_server::app_state::AppState;
use redline_server::config::ServerOptions;
use redline_server::middleware::{self, HandlerTimeout};
use redline_server::router::{build_app_router, build_metrics_router};

async fn boom() -> &'static str {
    panic!("boom")
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "late"
}

/// Same layering as the app listener, with test-only routes.
fn test_router(state: &AppState, limit: Duration) -> Router {
    Router::new()
        .route("/boom", get(boom))
        .route("/slow", get(slow))
        .route("/ok", get(|| async { "ok" }))
        .route_layer(from_fn_with_state(state.clone(), middleware::instrument))
        .route_layer(from_fn_with_state(HandlerTimeout(Some(limit)), middleware::handler_timeout))
        .with_state(state.clone())
}

async fn drain(router: Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = router.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

async fn concurrent_hellos(n: u64) {
    let state = AppState::default();
    let opts = ServerOptions::new("127.0.0.1", 8080).unwrap();
    let router = build_app_router(state.clone(), &opts);

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..n {
        let router = router.clone();
        tasks.spawn(async move {
            let req = Request::get("/hello").body(Body::empty()).unwrap();
            drain(router, req).await
        });
    }
    while let Some(res) = tasks.join_next().await {
        let (status, body) = res.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"Hello, World!\n");
    }

    let m = state.metrics();
    assert_eq!(m.requests_total.get(&["GET", "/hello", "200"]), n);
    assert_eq!(m.request_duration.sample_count(&["GET", "/hello", "200"]), n);
    assert_eq!(m.inflight.get(&["/hello"]), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn counts_single_request() {
    concurrent_hellos(1).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn counts_ten_concurrent_requests() {
    concurrent_hellos(10).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn counts_a_thousand_concurrent_requests() {
    concurrent_hellos(1000).await;
}

#[tokio::test]
async fn panic_becomes_500_and_is_counted_once() {
    let state = AppState::default();
    let router = test_router(&state, Duration::from_secs(1));

    let (status, body) = drain(router.clone(), Request::get("/boom").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let m = state.metrics();
    assert_eq!(m.panics_total.get(&["/boom"]), 1);
    assert_eq!(m.requests_total.get(&["GET", "/boom", "500"]), 1);
    assert_eq!(m.inflight.get(&["/boom"]), 0);
    assert_eq!(m.request_duration.sample_count(&["GET", "/boom", "500"]), 1);
    let size = m.response_size.snapshot(&["GET", "/boom", "500"]).unwrap();
    assert_eq!(size.count, 1);
    assert_eq!(size.sum, body.len() as f64);
    assert_eq!(body, b"Internal Server Error\n");

    // the stack keeps serving after a panic
    let (status, body) = drain(router, Request::get("/ok").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
    assert_eq!(m.panics_total.get(&["/boom"]), 1);
}

#[tokio::test]
async fn handler_timeout_is_recorded_as_503() {
    let state = AppState::default();
    let router = test_router(&state, Duration::from_millis(50));

    let (status, body) = drain(router, Request::get("/slow").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, b"Service Timeout");

    let m = state.metrics();
    assert_eq!(m.requests_total.get(&["GET", "/slow", "503"]), 1);
    assert_eq!(m.inflight.get(&["/slow"]), 0);
}

#[tokio::test]
async fn sizes_are_recorded() {
    let state = AppState::default();
    let opts = ServerOptions::new("127.0.0.1", 8080).unwrap();
    let router = build_app_router(state.clone(), &opts);

    let payload = r#"{"type":"repeat","msg":"size"}"#;
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/message")
        .header(header::CONTENT_LENGTH, payload.len())
        .body(Body::from(payload))
        .unwrap();
    let (status, body) = drain(router.clone(), req).await;
    assert_eq!(status, StatusCode::OK);

    let m = state.metrics();
    let req_size = m.request_size.snapshot(&["POST", "/api/message"]).unwrap();
    assert_eq!(req_size.count, 1);
    assert_eq!(req_size.sum, payload.len() as f64);

    let resp_size = m.response_size.snapshot(&["POST", "/api/message", "200"]).unwrap();
    assert_eq!(resp_size.count, 1);
    assert_eq!(resp_size.sum, body.len() as f64);

    let (_, body) = drain(router, Request::get("/hello").body(Body::empty()).unwrap()).await;
    let hello = m.response_size.snapshot(&["GET", "/hello", "200"]).unwrap();
    assert_eq!(hello.sum, body.len() as f64);
    assert!(m.request_size.snapshot(&["GET", "/hello"]).is_none());
}

#[tokio::test]
async fn metrics_endpoint_exposes_every_family() {
    let state = AppState::default();
    let opts = ServerOptions::new("127.0.0.1", 9090).unwrap();
    let app = build_app_router(state.clone(), &opts);
    let _ = drain(app, Request::get("/hello").body(Body::empty()).unwrap()).await;

    let metrics = build_metrics_router(state.clone(), &opts);
    let resp = metrics
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/plain"));
    let text = String::from_utf8(resp.into_body().collect().await.unwrap().to_bytes().to_vec()).unwrap();

    for family in [
        "http_requests_total",
        "http_request_duration_seconds",
        "http_inflight_requests",
        "http_request_size_bytes",
        "http_response_size_bytes",
        "http_panics_total",
    ] {
        assert!(text.contains(&format!("# TYPE {family} ")), "missing {family}");
    }
    assert!(text.contains(r#"http_requests_total{method="GET",route="/hello",status="200"} 1"#));
    // scrapes are not instrumented
    assert!(!text.contains("/metrics"));

    let req = Request::get("/metrics")
        .header(header::ACCEPT, "application/openmetrics-text; version=1.0.0")
        .body(Body::empty())
        .unwrap();
    let resp = metrics.oneshot(req).await.unwrap();
    assert!(resp.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("application/openmetrics-text"));
    let text = String::from_utf8(resp.into_body().collect().await.unwrap().to_bytes().to_vec()).unwrap();
    assert!(text.contains("# TYPE http_requests counter"));
    assert!(text.ends_with("# EOF\n"));
}
