//! corelink-client: Client for a remote corelink system core
//!
//! Connects to a system core over a WebSocket, authenticates once, then
//! mirrors the server's exported object graph locally: cached properties,
//! correlated method calls, and signal subscriptions, for the life of the
//! connection.
//!
//! The entry point is [`CoreClient`]:
//!
//! ```no_run
//! # async fn run() -> corelink_utils::Result<()> {
//! use corelink_client::CoreClient;
//!
//! let client = CoreClient::new();
//! client.connect("ws://core.local:8000", Some("admin"), Some("secret")).await?;
//!
//! let log = client.log()?;
//! let lines = log.invoke("readLog", vec![10.into()]).await?;
//! println!("{lines}");
//!
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod channel;
pub mod client;
pub mod connection;
pub mod proxy;
pub mod transport;

// Re-export the public surface at crate root
pub use channel::{ObjectChannel, SignalHandle};
pub use client::{ConnectionState, CoreClient};
pub use proxy::ObjectProxy;
pub use transport::{CloseInfo, SessionState, Transport};
