//! RED instrumentation middleware.
//!
//! Every request is bracketed by an [`Observation`]: created on entry (inflight
//! +1, request size), finalized exactly once when it is dropped (inflight -1,
//! request count, duration, response size). After the handler returns, the
//! observation rides inside the response body so the byte count reflects what
//! was actually polled out to the transport and the duration covers the full
//! response. If the request future is dropped before a response exists (the
//! handler timeout fired, or the client went away) the series is labelled 503.
//!
//! Handler panics are caught here, counted in `http_panics_total{route}`, and
//! turned into a plain 500 so the connection keeps serving.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::FutureExt;
use http_body::{Frame, SizeHint};

use crate::app_state::AppState;
use crate::obs::Registry;

/// Per-request observation state. Not shared across requests.
pub struct Observation {
    metrics: Arc<Registry>,
    method: String,
    route: String,
    start: Instant,
    status: Option<StatusCode>,
    bytes: u64,
}

impl Observation {
    pub fn begin(
        metrics: Arc<Registry>,
        method: String,
        route: String,
        content_length: Option<u64>,
    ) -> Self {
        metrics.inflight.inc(&[route.as_str()]);
        if let Some(len) = content_length.filter(|&n| n > 0) {
            metrics.request_size.observe(&[method.as_str(), route.as_str()], len as f64);
        }
        Self {
            metrics,
            method,
            route,
            start: Instant::now(),
            status: None,
            bytes: 0,
        }
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// Record the response status. Only the first call sticks.
    pub fn respond(&mut self, status: StatusCode) {
        self.status.get_or_insert(status);
    }

    pub fn add_bytes(&mut self, n: usize) {
        self.bytes += n as u64;
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        let m = &self.metrics;
        m.inflight.dec(&[self.route.as_str()]);

        let status = self.status.unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
        let labels = [self.method.as_str(), self.route.as_str(), status.as_str()];
        m.requests_total.inc(&labels);
        m.request_duration.observe_duration(&labels, self.start.elapsed());
        m.response_size.observe(&labels, self.bytes as f64);
    }
}

/// Response body wrapper counting data bytes as they are polled.
pub struct ObservedBody {
    inner: Body,
    observation: Option<Observation>,
}

impl ObservedBody {
    pub fn new(inner: Body, observation: Observation) -> Self {
        Self { inner, observation: Some(observation) }
    }
}

impl http_body::Body for ObservedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let (Some(data), Some(obs)) = (frame.data_ref(), this.observation.as_mut()) {
                    obs.add_bytes(data.len());
                }
            }
            // end of stream or transport error: emit now rather than on drop
            Poll::Ready(None) | Poll::Ready(Some(Err(_))) => {
                this.observation.take();
            }
            Poll::Pending => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

pub(crate) fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error\n").into_response()
}

fn content_length(req: &Request) -> Option<u64> {
    req.headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Wrap a route with RED metrics and a panic boundary.
pub async fn instrument(State(state): State<AppState>, req: Request, next: Next) -> Response {
    // raw path, no templating: every distinct path is its own series
    let route = req.uri().path().to_owned();
    let method = req.method().as_str().to_owned();
    let len = content_length(&req);
    let mut observation = Observation::begin(state.metrics_handle(), method, route, len);

    let response = match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            state.metrics().panics_total.inc(&[observation.route()]);
            tracing::error!(
                route = %observation.route(),
                panic = panic_message(&*payload),
                "handler panicked; responding 500"
            );
            internal_error()
        }
    };

    observation.respond(response.status());
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(ObservedBody::new(body, observation)))
}
