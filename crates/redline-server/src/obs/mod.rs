//! Observability: metric registry, process collectors, and log setup.
//!
//! Metrics are stored as atomics and rendered by the `/metrics` handler on the
//! dedicated metrics listener.

pub mod logging;
pub mod metrics;
pub mod process;

pub use metrics::{ExpositionFormat, Registry};
