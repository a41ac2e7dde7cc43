//! corelink-protocol: Shared wire definitions for the corelink object channel
//!
//! This crate defines all frame types exchanged between a corelink client and
//! a remote system core over a message-oriented WebSocket connection: the
//! one-shot authentication exchange, the channel frames that follow it, and
//! the object schema carried by the initial snapshot. Every frame is one
//! JSON-encoded message per UTF-8 text frame.

pub mod frames;
pub mod schema;

// Re-export main types at crate root
pub use frames::{AuthRequest, AuthResponse, ClientFrame, FrameError, ServerFrame};
pub use schema::{object_ref, referenced_object, ObjectSchema};

/// Current protocol version
pub const PROTOCOL_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    #[test]
    fn test_protocol_version_is_stable() {
        assert_eq!(super::PROTOCOL_VERSION, 1);
    }
}
