//! Object channel: per-session state machine over the transport
//!
//! Maintains the registry of exposed remote objects and their cached
//! property values, correlates method invocations with their responses,
//! and dispatches signal emissions to local subscribers. One instance
//! lives exactly as long as its session; a reconnect builds a fresh one.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::oneshot;

use corelink_protocol::{ClientFrame, ObjectSchema, ServerFrame};
use corelink_utils::{CorelinkError, Result};

use crate::connection::SendQueue;
use crate::transport::lock;

/// Signal subscriber callback, invoked with the emission's arguments
pub type SignalCallback = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// One exposed remote object: schema plus the live property cache
#[derive(Clone, Default)]
pub struct ObjectDescriptor {
    /// Property name to last server-confirmed value
    pub properties: HashMap<String, Value>,
    pub methods: Vec<String>,
    pub signals: Vec<String>,
    pub enums: HashMap<String, HashMap<String, i64>>,
}

impl From<ObjectSchema> for ObjectDescriptor {
    fn from(schema: ObjectSchema) -> Self {
        Self {
            properties: schema.properties,
            methods: schema.methods,
            signals: schema.signals,
            enums: schema.enums,
        }
    }
}

struct Subscriber {
    id: u64,
    callback: SignalCallback,
}

#[derive(Default)]
struct ChannelState {
    objects: HashMap<String, ObjectDescriptor>,
    pending: HashMap<u64, oneshot::Sender<Result<Value>>>,
    subscribers: HashMap<(String, String), Vec<Subscriber>>,
    init_waiter: Option<oneshot::Sender<Result<()>>>,
    torn_down: bool,
}

/// The session's object channel
///
/// All entry points are safe to call from any task. The internal lock is
/// never held across an await or while running subscriber callbacks.
pub struct ObjectChannel {
    queue: SendQueue,
    state: Mutex<ChannelState>,
    next_call_id: AtomicU64,
    next_subscriber_id: AtomicU64,
}

impl ObjectChannel {
    pub fn new(queue: SendQueue) -> Self {
        Self {
            queue,
            state: Mutex::new(ChannelState::default()),
            next_call_id: AtomicU64::new(0),
            next_subscriber_id: AtomicU64::new(0),
        }
    }

    /// Request the object-graph snapshot and wait for it to be applied.
    ///
    /// Must be called once, before any other channel operation. Fails with
    /// `ConnectionClosed` if the session ends before the snapshot arrives.
    pub async fn initialize(&self) -> Result<()> {
        let rx = {
            let mut state = lock(&self.state);
            if state.torn_down {
                return Err(CorelinkError::ConnectionClosed);
            }
            let (tx, rx) = oneshot::channel();
            state.init_waiter = Some(tx);
            rx
        };

        self.queue.send(ClientFrame::Init);

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(CorelinkError::ConnectionClosed),
        }
    }

    /// Apply one inbound frame. Called from the reader task, in arrival
    /// order.
    pub fn handle_incoming(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::Init { objects } => self.apply_snapshot(objects),
            ServerFrame::PropertyUpdate {
                object,
                property,
                value,
            } => self.apply_property_update(object, property, value),
            ServerFrame::Signal {
                object,
                signal,
                args,
            } => self.dispatch_signal(&object, &signal, &args),
            ServerFrame::Response {
                call_id,
                result,
                error,
            } => self.resolve_call(call_id, result, error),
        }
    }

    fn apply_snapshot(&self, objects: HashMap<String, ObjectSchema>) {
        let waiter = {
            let mut state = lock(&self.state);
            // A frame racing the teardown must not repopulate a dead channel
            if state.torn_down {
                return;
            }
            state.objects = objects
                .into_iter()
                .map(|(id, schema)| (id, schema.into()))
                .collect();
            state.init_waiter.take()
        };
        match waiter {
            Some(tx) => {
                let _ = tx.send(Ok(()));
            }
            None => tracing::warn!("unsolicited object snapshot applied"),
        }
    }

    fn apply_property_update(&self, object: String, property: String, value: Value) {
        let mut state = lock(&self.state);
        if state.torn_down {
            return;
        }
        match state.objects.get_mut(&object) {
            Some(descriptor) => {
                descriptor.properties.insert(property, value);
            }
            None => tracing::warn!(%object, %property, "property update for unknown object"),
        }
    }

    fn dispatch_signal(&self, object: &str, signal: &str, args: &[Value]) {
        // Snapshot the callbacks first; they run without the lock so a
        // subscriber may re-enter the channel
        let callbacks: Vec<SignalCallback> = {
            let state = lock(&self.state);
            match state
                .subscribers
                .get(&(object.to_string(), signal.to_string()))
            {
                Some(subs) => subs.iter().map(|s| s.callback.clone()).collect(),
                None => return,
            }
        };

        for callback in callbacks {
            // One panicking subscriber must not stop delivery to the rest
            if catch_unwind(AssertUnwindSafe(|| callback(args))).is_err() {
                tracing::error!(%object, %signal, "signal subscriber panicked");
            }
        }
    }

    fn resolve_call(&self, call_id: u64, result: Option<Value>, error: Option<String>) {
        let sender = lock(&self.state).pending.remove(&call_id);
        match sender {
            Some(tx) => {
                let outcome = match error {
                    Some(message) => Err(CorelinkError::RemoteCall(message)),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                let _ = tx.send(outcome);
            }
            None => tracing::debug!(call_id, "response for unknown call id dropped"),
        }
    }

    /// Invoke a method on a remote object and wait for its response.
    ///
    /// The call is registered before the frame is queued, so a response can
    /// never arrive before its waiter exists.
    pub async fn invoke(&self, object: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        let (call_id, rx) = {
            let mut state = lock(&self.state);
            if state.torn_down {
                return Err(CorelinkError::ConnectionClosed);
            }
            let descriptor = state
                .objects
                .get(object)
                .ok_or_else(|| CorelinkError::ObjectNotFound(object.to_string()))?;
            if !descriptor.methods.iter().any(|m| m == method) {
                return Err(CorelinkError::MethodNotFound {
                    object: object.to_string(),
                    method: method.to_string(),
                });
            }
            let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed) + 1;
            let (tx, rx) = oneshot::channel();
            state.pending.insert(call_id, tx);
            (call_id, rx)
        };

        self.queue.send(ClientFrame::InvokeMethod {
            object: object.to_string(),
            method: method.to_string(),
            call_id,
            args,
        });

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(CorelinkError::ConnectionClosed),
        }
    }

    /// Read a property from the local cache
    pub fn property(&self, object: &str, name: &str) -> Result<Value> {
        let state = lock(&self.state);
        let descriptor = state
            .objects
            .get(object)
            .ok_or_else(|| CorelinkError::ObjectNotFound(object.to_string()))?;
        descriptor
            .properties
            .get(name)
            .cloned()
            .ok_or_else(|| CorelinkError::PropertyNotFound {
                object: object.to_string(),
                property: name.to_string(),
            })
    }

    /// Request a property change.
    ///
    /// Returns as soon as the request is queued; the cached value only
    /// changes when the server echoes the update back.
    pub fn set_property(&self, object: &str, name: &str, value: Value) -> Result<()> {
        {
            let state = lock(&self.state);
            if state.torn_down {
                return Err(CorelinkError::ConnectionClosed);
            }
            let descriptor = state
                .objects
                .get(object)
                .ok_or_else(|| CorelinkError::ObjectNotFound(object.to_string()))?;
            if !descriptor.properties.contains_key(name) {
                return Err(CorelinkError::PropertyNotFound {
                    object: object.to_string(),
                    property: name.to_string(),
                });
            }
        }

        self.queue.send(ClientFrame::SetProperty {
            object: object.to_string(),
            property: name.to_string(),
            value,
        });
        Ok(())
    }

    /// Attach a callback to a remote signal.
    ///
    /// The first subscriber for a given signal registers interest with the
    /// server. Callbacks for one emission run in subscription order.
    pub fn subscribe(
        self: &Arc<Self>,
        object: &str,
        signal: &str,
        callback: impl Fn(&[Value]) + Send + Sync + 'static,
    ) -> Result<SignalHandle> {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed) + 1;
        let first = {
            let mut state = lock(&self.state);
            if state.torn_down {
                return Err(CorelinkError::ConnectionClosed);
            }
            let descriptor = state
                .objects
                .get(object)
                .ok_or_else(|| CorelinkError::ObjectNotFound(object.to_string()))?;
            if !descriptor.signals.iter().any(|s| s == signal) {
                return Err(CorelinkError::SignalNotFound {
                    object: object.to_string(),
                    signal: signal.to_string(),
                });
            }
            let subs = state
                .subscribers
                .entry((object.to_string(), signal.to_string()))
                .or_default();
            subs.push(Subscriber {
                id,
                callback: Arc::new(callback),
            });
            subs.len() == 1
        };

        if first {
            self.queue.send(ClientFrame::ConnectSignal {
                object: object.to_string(),
                signal: signal.to_string(),
            });
        }

        Ok(SignalHandle {
            channel: Arc::clone(self),
            object: object.to_string(),
            signal: signal.to_string(),
            id,
        })
    }

    fn unsubscribe(&self, object: &str, signal: &str, id: u64) {
        let key = (object.to_string(), signal.to_string());
        let emptied = {
            let mut state = lock(&self.state);
            let Some(subs) = state.subscribers.get_mut(&key) else {
                return;
            };
            subs.retain(|s| s.id != id);
            if subs.is_empty() {
                state.subscribers.remove(&key);
                !state.torn_down
            } else {
                false
            }
        };

        if emptied {
            self.queue.send(ClientFrame::DisconnectSignal {
                object: object.to_string(),
                signal: signal.to_string(),
            });
        }
    }

    /// Shut the channel down: reject every outstanding call, drop all
    /// subscribers, clear the registry. Idempotent; called on any session
    /// end, local or remote.
    pub fn teardown(&self) {
        let (pending, waiter) = {
            let mut state = lock(&self.state);
            if state.torn_down {
                return;
            }
            state.torn_down = true;
            state.objects.clear();
            state.subscribers.clear();
            (std::mem::take(&mut state.pending), state.init_waiter.take())
        };

        for (_, tx) in pending {
            let _ = tx.send(Err(CorelinkError::ConnectionClosed));
        }
        if let Some(tx) = waiter {
            let _ = tx.send(Err(CorelinkError::ConnectionClosed));
        }
    }

    /// Whether the registry currently holds the given object
    pub fn has_object(&self, object: &str) -> bool {
        lock(&self.state).objects.contains_key(object)
    }

    /// Ids of all exposed objects
    pub fn object_ids(&self) -> Vec<String> {
        lock(&self.state).objects.keys().cloned().collect()
    }

    /// Full descriptor of one object, for introspection
    pub fn descriptor(&self, object: &str) -> Result<ObjectDescriptor> {
        lock(&self.state)
            .objects
            .get(object)
            .cloned()
            .ok_or_else(|| CorelinkError::ObjectNotFound(object.to_string()))
    }
}

/// Handle tied to one signal subscription
///
/// Dropping the handle keeps the subscription alive; call
/// [`SignalHandle::unsubscribe`] to detach the callback.
pub struct SignalHandle {
    channel: Arc<ObjectChannel>,
    object: String,
    signal: String,
    id: u64,
}

impl std::fmt::Debug for SignalHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHandle")
            .field("object", &self.object)
            .field("signal", &self.signal)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl SignalHandle {
    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn signal(&self) -> &str {
        &self.signal
    }

    /// Detach the callback. Removing the last subscriber for a signal drops
    /// the server-side registration too.
    pub fn unsubscribe(self) {
        self.channel.unsubscribe(&self.object, &self.signal, self.id);
    }
}
