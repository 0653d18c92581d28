//! Per-request time limits.
//!
//! - `handler_timeout`: hard ceiling on producing a response; 503 on expiry.
//! - `read_timeout`: the whole request body must arrive in time; 408 on expiry.
//!   The body is buffered (at most [`MAX_BODY_BYTES`], 413 beyond) so handlers
//!   downstream read from memory.

use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::config::ServerOptions;

#[derive(Debug, Clone, Copy)]
pub struct HandlerTimeout(pub Option<Duration>);

impl From<&ServerOptions> for HandlerTimeout {
    fn from(opts: &ServerOptions) -> Self {
        Self(opts.handler_timeout())
    }
}

/// Same ceiling as axum's `DefaultBodyLimit`.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct ReadTimeout {
    pub limit: Option<Duration>,
    pub max_body: usize,
}

impl From<&ServerOptions> for ReadTimeout {
    fn from(opts: &ServerOptions) -> Self {
        Self { limit: opts.read_timeout(), max_body: MAX_BODY_BYTES }
    }
}

pub async fn handler_timeout(
    State(HandlerTimeout(limit)): State<HandlerTimeout>,
    req: Request,
    next: Next,
) -> Response {
    let Some(limit) = limit else {
        return next.run(req).await;
    };
    let path = req.uri().path().to_owned();
    match tokio::time::timeout(limit, next.run(req)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(%path, ?limit, "handler timed out");
            (StatusCode::SERVICE_UNAVAILABLE, "Service Timeout").into_response()
        }
    }
}

pub async fn read_timeout(
    State(ReadTimeout { limit, max_body }): State<ReadTimeout>,
    req: Request,
    next: Next,
) -> Response {
    let Some(limit) = limit else {
        return next.run(req).await;
    };
    let (parts, body) = req.into_parts();
    match tokio::time::timeout(limit, Limited::new(body, max_body).collect()).await {
        Ok(Ok(collected)) => {
            let req = Request::from_parts(parts, Body::from(collected.to_bytes()));
            next.run(req).await
        }
        Ok(Err(e)) if e.downcast_ref::<LengthLimitError>().is_some() => {
            tracing::debug!(path = %parts.uri.path(), max_body, "request body too large");
            (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large\n").into_response()
        }
        Ok(Err(e)) => {
            tracing::debug!(error = %e, path = %parts.uri.path(), "request body read failed");
            (StatusCode::BAD_REQUEST, "failed to read request body\n").into_response()
        }
        Err(_) => {
            tracing::warn!(path = %parts.uri.path(), ?limit, "request body read timed out");
            (StatusCode::REQUEST_TIMEOUT, "Request Timeout\n").into_response()
        }
    }
}
