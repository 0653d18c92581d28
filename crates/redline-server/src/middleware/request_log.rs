//! Request-scoped logger.
//!
//! The middleware builds a span carrying method, path, peer and user agent,
//! runs the rest of the stack inside it, and hands the same span to handlers
//! as the [`RequestLog`] extractor parameter.

use std::convert::Infallible;
use std::net::SocketAddr;

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, FromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::{Instrument, Span};

#[derive(Debug, Clone)]
pub struct RequestLog {
    span: Span,
}

impl RequestLog {
    pub fn from_parts(parts: &Parts) -> Self {
        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_else(|| "unknown".into());
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let span = tracing::info_span!(
            "request",
            method = %parts.method,
            path = %parts.uri.path(),
            remote_addr = %remote_addr,
            user_agent = %user_agent,
        );
        Self { span }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

pub async fn request_log(req: Request, next: Next) -> Response {
    let (mut parts, body) = req.into_parts();
    let log = RequestLog::from_parts(&parts);
    let span = log.span.clone();
    parts.extensions.insert(log);
    next.run(Request::from_parts(parts, body)).instrument(span).await
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestLog
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // built on the spot when the route is mounted without `request_log`
        Ok(parts
            .extensions
            .get::<RequestLog>()
            .cloned()
            .unwrap_or_else(|| RequestLog::from_parts(parts)))
    }
}
