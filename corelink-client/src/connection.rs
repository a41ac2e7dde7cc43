//! Session plumbing between the transport and the object channel
//!
//! The send queue decouples frame submission from socket writes so callers
//! never block on the wire; the reader task forwards inbound frames to the
//! object channel for the life of the session.

mod reader;
mod sender;

pub use reader::spawn_reader;
pub use sender::SendQueue;

#[cfg(test)]
pub(crate) use sender::{test_queue, Outbound};
