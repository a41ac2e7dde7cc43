//! Client-server frame types
//!
//! The session starts with a one-shot credential exchange ([`AuthRequest`] /
//! [`AuthResponse`]); every frame after that is a tagged channel frame
//! ([`ClientFrame`] / [`ServerFrame`]).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::ObjectSchema;

/// Frame encode/decode error
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Credential frame sent by the client as the very first message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub user: String,
    pub password: String,
}

/// Authentication result, sent by the server exactly once before any
/// other traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub authenticated: bool,
    /// Server-provided failure message, present iff `authenticated` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Frames sent from client to server after authentication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Request the full object-graph snapshot
    Init,

    /// Invoke a method on a remote object, correlated by `callId`
    #[serde(rename_all = "camelCase")]
    InvokeMethod {
        object: String,
        method: String,
        call_id: u64,
        args: Vec<Value>,
    },

    /// Request a property change (the cache only updates once the server
    /// echoes a property update)
    SetProperty {
        object: String,
        property: String,
        value: Value,
    },

    /// Register interest in a signal (sent when the first local subscriber
    /// appears)
    ConnectSignal { object: String, signal: String },

    /// Drop interest in a signal (sent after the last local subscriber is
    /// removed)
    DisconnectSignal { object: String, signal: String },
}

/// Frames sent from server to client after authentication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// The one-time snapshot of all exposed objects and their schema
    Init {
        objects: HashMap<String, ObjectSchema>,
    },

    /// Server-confirmed property change
    PropertyUpdate {
        object: String,
        property: String,
        value: Value,
    },

    /// Signal emission with arguments
    Signal {
        object: String,
        signal: String,
        args: Vec<Value>,
    },

    /// Method return, correlated by `callId`; exactly one of `result` and
    /// `error` is meaningful
    #[serde(rename_all = "camelCase")]
    Response {
        call_id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl AuthRequest {
    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl AuthResponse {
    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl ClientFrame {
    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl ServerFrame {
    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(text)?)
    }
}
