//! Connection lifecycle facade
//!
//! [`CoreClient`] owns at most one live session at a time and walks it
//! through connect, authenticate, channel init, steady state, and
//! disconnect. Named accessors resolve the well-known objects a system
//! core exposes through its root object.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use url::Url;

use corelink_protocol::referenced_object;
use corelink_utils::{CorelinkError, Result};

use crate::auth;
use crate::channel::ObjectChannel;
use crate::connection::{spawn_reader, SendQueue};
use crate::proxy::ObjectProxy;
use crate::transport::{lock, SessionShared, Transport};

/// Id of the root object in the snapshot
const ROOT_OBJECT: &str = "root";

/// Well-known id of the system command object
const SYSTEM_OBJECT: &str = "SystemCommands";

/// Lifecycle state of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    ChannelInit,
    Connected,
    Disconnecting,
}

/// Client for one remote system core
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct CoreClient {
    inner: Arc<ClientInner>,
}

struct ActiveSession {
    channel: Arc<ObjectChannel>,
    queue: SendQueue,
    reader: JoinHandle<()>,
    monitor: JoinHandle<()>,
}

struct ClientInner {
    state: Mutex<ConnectionState>,
    session: Mutex<Option<ActiveSession>>,
    /// Serializes concurrent connect attempts
    connect_guard: tokio::sync::Mutex<()>,
    connected_tx: broadcast::Sender<bool>,
    /// Session state of the most recent transport, kept after close so the
    /// close code and reason stay inspectable
    last_shared: Mutex<Option<Arc<SessionShared>>>,
}

impl CoreClient {
    pub fn new() -> Self {
        let (connected_tx, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(ClientInner {
                state: Mutex::new(ConnectionState::Disconnected),
                session: Mutex::new(None),
                connect_guard: tokio::sync::Mutex::new(()),
                connected_tx,
                last_shared: Mutex::new(None),
            }),
        }
    }

    /// Connect to a core, replacing any existing session.
    ///
    /// Explicit credentials override URL-embedded ones; with neither, the
    /// guest account is used. On any failure the client is back in the
    /// disconnected state with the error describing the failed stage.
    pub async fn connect(
        &self,
        url: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<()> {
        self.inner.clone().connect(url, user, password).await
    }

    /// Tear the session down: close the socket, cancel the reader, reject
    /// all outstanding calls. Idempotent; a no-op when disconnected.
    pub async fn disconnect(&self) {
        self.inner.disconnect().await;
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *lock(&self.inner.state)
    }

    /// Whether a session is currently established
    pub fn connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribe to connectivity transitions: `true` after a successful
    /// connect, `false` after any disconnect
    pub fn connected_changed(&self) -> broadcast::Receiver<bool> {
        self.inner.connected_tx.subscribe()
    }

    /// Close code of the last session, if the server ended it
    pub fn close_code(&self) -> Option<u16> {
        self.last_close().map(|info| info.code)
    }

    /// Close reason of the last session, if the server ended it
    pub fn close_reason(&self) -> Option<String> {
        self.last_close().map(|info| info.reason)
    }

    fn last_close(&self) -> Option<crate::transport::CloseInfo> {
        lock(&self.inner.last_shared)
            .as_ref()
            .and_then(|shared| shared.close_info())
    }

    /// Proxy for an arbitrary exposed object
    pub fn object(&self, id: &str) -> Result<ObjectProxy> {
        let channel = self.inner.channel()?;
        if !channel.has_object(id) {
            return Err(CorelinkError::ObjectNotFound(id.to_string()));
        }
        Ok(ObjectProxy::new(channel, id.to_string()))
    }

    /// Ids of all exposed objects
    pub fn object_ids(&self) -> Result<Vec<String>> {
        Ok(self.inner.channel()?.object_ids())
    }

    /// The core's system logic object
    pub fn system_logic(&self) -> Result<ObjectProxy> {
        self.root_ref("systemLogic")
    }

    /// The core's log object
    pub fn log(&self) -> Result<ObjectProxy> {
        self.root_ref("log")
    }

    /// The core's settings object
    pub fn settings(&self) -> Result<ObjectProxy> {
        self.root_ref("settings")
    }

    /// The system command object (reboot, shutdown, firmware handling)
    pub fn system(&self) -> Result<ObjectProxy> {
        self.object(SYSTEM_OBJECT)
    }

    /// Identity string the core reports for itself
    pub fn identity(&self) -> Result<String> {
        let value = self.inner.channel()?.property(ROOT_OBJECT, "identity")?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CorelinkError::protocol("root property 'identity' is not a string"))
    }

    /// Installed module objects, by module name
    pub fn modules(&self) -> Result<HashMap<String, ObjectProxy>> {
        let channel = self.inner.channel()?;
        let value = channel.property(ROOT_OBJECT, "modules")?;
        let Value::Object(entries) = value else {
            return Err(CorelinkError::protocol(
                "root property 'modules' is not a map",
            ));
        };

        let mut modules = HashMap::new();
        for (name, entry) in entries {
            let id = referenced_object(&entry).ok_or_else(|| {
                CorelinkError::protocol(format!("module '{}' is not an object reference", name))
            })?;
            modules.insert(name, ObjectProxy::new(channel.clone(), id.to_string()));
        }
        Ok(modules)
    }

    fn root_ref(&self, property: &str) -> Result<ObjectProxy> {
        let channel = self.inner.channel()?;
        let value = channel.property(ROOT_OBJECT, property)?;
        let id = referenced_object(&value).ok_or_else(|| {
            CorelinkError::protocol(format!(
                "root property '{}' is not an object reference",
                property
            ))
        })?;
        if !channel.has_object(id) {
            return Err(CorelinkError::ObjectNotFound(id.to_string()));
        }
        Ok(ObjectProxy::new(channel, id.to_string()))
    }
}

impl Default for CoreClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientInner {
    fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }

    fn channel(&self) -> Result<Arc<ObjectChannel>> {
        lock(&self.session)
            .as_ref()
            .map(|session| session.channel.clone())
            .ok_or(CorelinkError::ConnectionClosed)
    }

    async fn connect(
        self: Arc<Self>,
        url: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<()> {
        let _guard = self.connect_guard.lock().await;

        // Replace rather than stack sessions
        self.disconnect().await;

        let parsed = Url::parse(url).map_err(|e| CorelinkError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let (user, password) = auth::resolve_credentials(&parsed, user, password);

        *lock(&self.last_shared) = None;
        self.set_state(ConnectionState::Connecting);
        tracing::info!(url = %parsed, user = %user, "connecting");

        match self.establish(&parsed, &user, &password).await {
            Ok(session) => {
                *lock(&self.session) = Some(session);
                self.set_state(ConnectionState::Connected);
                let _ = self.connected_tx.send(true);
                tracing::info!("connected");
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                tracing::warn!("connect failed: {}", e);
                Err(e)
            }
        }
    }

    async fn establish(
        self: &Arc<Self>,
        url: &Url,
        user: &str,
        password: &str,
    ) -> Result<ActiveSession> {
        let mut transport = Transport::connect(url).await?;
        *lock(&self.last_shared) = Some(transport.shared());

        self.set_state(ConnectionState::Authenticating);
        auth::authenticate(&mut transport, user, password).await?;

        let (writer, reader) = transport.into_parts();
        let queue = SendQueue::spawn(writer);
        let channel = Arc::new(ObjectChannel::new(queue.clone()));

        let (close_tx, close_rx) = oneshot::channel();
        let reader_task = spawn_reader(reader, channel.clone(), close_tx);

        // Finishes the disconnect when the server ends the session. Holds
        // only a weak handle so a dropped client does not linger.
        let monitor = tokio::spawn({
            let weak = Arc::downgrade(self);
            async move {
                if close_rx.await.is_ok() {
                    if let Some(inner) = weak.upgrade() {
                        inner.disconnect().await;
                    }
                }
            }
        });

        self.set_state(ConnectionState::ChannelInit);
        if let Err(e) = channel.initialize().await {
            queue.close().await;
            reader_task.abort();
            monitor.abort();
            channel.teardown();
            return Err(e);
        }

        Ok(ActiveSession {
            channel,
            queue,
            reader: reader_task,
            monitor,
        })
    }

    async fn disconnect(&self) {
        // Single take decides the winner when disconnects race
        let Some(session) = lock(&self.session).take() else {
            return;
        };

        self.set_state(ConnectionState::Disconnecting);
        session.queue.close().await;
        session.reader.abort();
        session.monitor.abort();
        session.channel.teardown();
        self.set_state(ConnectionState::Disconnected);
        let _ = self.connected_tx.send(false);
        tracing::info!("disconnected");
    }
}
