//! redline server library entry.
//!
//! Wires configuration, the two HTTP listeners (app + metrics), the
//! instrumentation middleware and the built-in handlers into one stack. It is
//! consumed by the binary (`main.rs`) and by integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod app_state;
pub mod config;
pub mod middleware;
pub mod obs;
pub mod ops;
pub mod router;
pub mod services;
pub mod transport;
