//! redline core: error surface and JSON message wire types.
//!
//! This crate carries no transport or runtime dependencies so the message
//! contract can be exercised without standing up a server.
//!
//! Panics, `unwrap`, and `expect` are compile-denied here; malformed input must
//! surface as a `RedlineError`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{Result, RedlineError};
