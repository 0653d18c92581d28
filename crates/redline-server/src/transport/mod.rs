//! Listener lifecycle (bind/serve/drain), signal handling, and the
//! two-listener coordinator.

pub mod lifecycle;
pub mod server;
pub mod shutdown;

pub use lifecycle::{Servers, SHUTDOWN_DEADLINE};
pub use server::{serve, serve_listener, LifecycleState, ServerHandle};
pub use shutdown::shutdown_signal;
