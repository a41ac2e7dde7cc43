//! Error types for corelink
//!
//! Provides a unified error type used across all corelink crates.

/// Main error type for corelink operations
#[derive(Debug, thiserror::Error)]
pub enum CorelinkError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // === Transport Errors ===

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid endpoint URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Connection closed")]
    ConnectionClosed,

    // === Authentication Errors ===

    #[error("Authentication failed: {0}")]
    Authentication(String),

    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Remote call failed: {0}")]
    RemoteCall(String),

    // === Object Registry Errors ===

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Object {object} has no property '{property}'")]
    PropertyNotFound { object: String, property: String },

    #[error("Object {object} has no method '{method}'")]
    MethodNotFound { object: String, method: String },

    #[error("Object {object} has no signal '{signal}'")]
    SignalNotFound { object: String, signal: String },

    #[error("Object {object} has no enum '{name}'")]
    EnumNotFound { object: String, name: String },

    #[error("Enum {name} of object {object} has no member '{member}'")]
    EnumMemberNotFound {
        object: String,
        name: String,
        member: String,
    },

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CorelinkError {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an authentication error
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error means the session is gone
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

/// Result type alias using CorelinkError
pub type Result<T> = std::result::Result<T, CorelinkError>;
