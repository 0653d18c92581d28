//! Application endpoints served on the app listener.

pub mod hello;
pub mod message;

pub use hello::hello;
pub use message::message;
