//! `POST /api/message`: echo (`repeat`) or current UTC time (`time`).
//!
//! Validation failures are ordinary 400 responses, never panics.

use axum::{
    body::Bytes,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;

use redline_core::error::RedlineError;
use redline_core::protocol::{decode_request, MessageReply};

use crate::middleware::RequestLog;

fn reject(log: &RequestLog, err: &RedlineError) -> Response {
    let (status, body) = match err {
        RedlineError::InvalidJson(_) => (StatusCode::BAD_REQUEST, "invalid JSON\n"),
        RedlineError::UnknownType(_) => (StatusCode::BAD_REQUEST, "unknown type\n"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode response\n"),
    };
    tracing::error!(parent: log.span(), code = err.client_code().as_str(), error = %err, "message rejected");
    (status, body).into_response()
}

pub async fn message(log: RequestLog, body: Bytes) -> Response {
    let reply = decode_request(&body).and_then(|req| MessageReply::answer(req, Utc::now()));
    let line = match reply.and_then(|r| r.to_json_line()) {
        Ok(line) => line,
        Err(e) => return reject(&log, &e),
    };

    tracing::debug!(parent: log.span(), "handled message request");
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        line,
    )
        .into_response()
}
