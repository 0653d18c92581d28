//! `/api/message` JSON contract.
//!
//! Requests carry a `type` discriminator plus an optional `msg`; unknown
//! fields are ignored. Replies are tagged the same way so clients can switch
//! on `type` without inspecting the rest of the object.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RedlineError, Result};

/// Incoming message payload.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRequest {
    /// Message kind (field name is `type` in JSON). A missing field decodes to
    /// the empty string and is later rejected as an unknown type.
    #[serde(rename = "type", default)]
    pub msg_type: String,
    /// Text to echo back for `repeat`.
    #[serde(default)]
    pub msg: Option<String>,
}

/// Supported message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Repeat,
    Time,
}

impl MessageKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "repeat" => Ok(MessageKind::Repeat),
            "time" => Ok(MessageKind::Time),
            other => Err(RedlineError::UnknownType(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Repeat => "repeat",
            MessageKind::Time => "time",
        }
    }
}

/// Outgoing reply, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageReply {
    Repeat { msg: String },
    Time { time: String },
}

/// Decode a request body. Any serde failure maps to `InvalidJson`.
pub fn decode_request(body: &[u8]) -> Result<MessageRequest> {
    serde_json::from_slice(body).map_err(|e| RedlineError::InvalidJson(e.to_string()))
}

/// RFC3339, UTC, whole seconds, `Z` suffix.
pub fn format_time(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl MessageReply {
    /// Build the reply for `req`, using `now` for `time` requests.
    pub fn answer(req: MessageRequest, now: DateTime<Utc>) -> Result<Self> {
        match MessageKind::parse(&req.msg_type)? {
            MessageKind::Repeat => Ok(MessageReply::Repeat {
                msg: req.msg.unwrap_or_default(),
            }),
            MessageKind::Time => Ok(MessageReply::Time {
                time: format_time(now),
            }),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            MessageReply::Repeat { .. } => MessageKind::Repeat,
            MessageReply::Time { .. } => MessageKind::Time,
        }
    }

    /// Serialize as a single newline-terminated JSON line.
    pub fn to_json_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)
            .map_err(|e| RedlineError::Internal(format!("encode reply failed: {e}")))?;
        line.push('\n');
        Ok(line)
    }
}
