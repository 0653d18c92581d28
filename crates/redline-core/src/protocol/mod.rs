//! Wire types exchanged with HTTP clients.

pub mod message;

pub use message::{decode_request, MessageKind, MessageReply, MessageRequest};
