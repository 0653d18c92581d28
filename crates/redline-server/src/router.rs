//! Axum router wiring for both listeners.
//!
//! Every layer is a `route_layer`, so unknown paths fall through to a plain 404
//! without minting metric series or having their body read.

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};

use crate::app_state::AppState;
use crate::config::ServerOptions;
use crate::middleware::{self, HandlerTimeout, ReadTimeout};
use crate::{ops, services};

/// Application listener: `/hello` and `/api/message`, instrumented.
pub fn build_app_router(state: AppState, opts: &ServerOptions) -> Router {
    Router::new()
        .route("/hello", get(services::hello))
        .route("/api/message", post(services::message))
        .route_layer(from_fn(middleware::request_log))
        .route_layer(from_fn_with_state(state.clone(), middleware::instrument))
        .route_layer(from_fn_with_state(HandlerTimeout::from(opts), middleware::handler_timeout))
        .route_layer(from_fn_with_state(ReadTimeout::from(opts), middleware::read_timeout))
        .with_state(state)
}

/// Metrics listener: `/metrics` only, not instrumented.
pub fn build_metrics_router(state: AppState, opts: &ServerOptions) -> Router {
    Router::new()
        .route("/metrics", get(ops::metrics))
        .route_layer(from_fn_with_state(HandlerTimeout::from(opts), middleware::handler_timeout))
        .route_layer(from_fn_with_state(ReadTimeout::from(opts), middleware::read_timeout))
        .with_state(state)
}
