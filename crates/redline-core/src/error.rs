//! Shared error type across redline crates.

use std::time::Duration;

use thiserror::Error;

/// Stable error codes, used in logs and by tests to classify failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Request body was not valid JSON.
    InvalidJson,
    /// Message `type` is not one of the supported kinds.
    UnknownType,
    /// Startup configuration rejected.
    Config,
    /// Listener could not bind its socket.
    Bind,
    /// Listener terminated unexpectedly.
    Serve,
    /// Graceful drain did not finish before the deadline.
    ShutdownTimeout,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in structured logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::InvalidJson => "INVALID_JSON",
            ClientCode::UnknownType => "UNKNOWN_TYPE",
            ClientCode::Config => "CONFIG",
            ClientCode::Bind => "BIND",
            ClientCode::Serve => "SERVE",
            ClientCode::ShutdownTimeout => "SHUTDOWN_TIMEOUT",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, RedlineError>;

/// Unified error type used by core and server.
#[derive(Debug, Error)]
pub enum RedlineError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("unknown type: {0:?}")]
    UnknownType(String),
    #[error("config: {0}")]
    Config(String),
    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("serve: {0}")]
    Serve(String),
    #[error("{server} server shutdown exceeded deadline of {deadline:?}")]
    ShutdownTimedOut { server: String, deadline: Duration },
    #[error("internal: {0}")]
    Internal(String),
}

impl RedlineError {
    /// Map an error to its stable code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            RedlineError::InvalidJson(_) => ClientCode::InvalidJson,
            RedlineError::UnknownType(_) => ClientCode::UnknownType,
            RedlineError::Config(_) => ClientCode::Config,
            RedlineError::Bind { .. } => ClientCode::Bind,
            RedlineError::Serve(_) => ClientCode::Serve,
            RedlineError::ShutdownTimedOut { .. } => ClientCode::ShutdownTimeout,
            RedlineError::Internal(_) => ClientCode::Internal,
        }
    }
}
