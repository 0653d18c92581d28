//! Route middleware, innermost first: `request_log` → `instrument` →
//! `handler_timeout` → `read_timeout`.

pub mod instrument;
pub mod request_log;
pub mod timeout;

pub use instrument::{instrument, ObservedBody, Observation};
pub use request_log::{request_log, RequestLog};
pub use timeout::{handler_timeout, read_timeout, HandlerTimeout, ReadTimeout, MAX_BODY_BYTES};
