//! Object proxies
//!
//! An [`ObjectProxy`] is a thin, cloneable handle binding one object id to
//! the session's channel. It adds no state of its own; every operation goes
//! straight to the channel, so a proxy held across a disconnect simply
//! starts returning errors.

use std::sync::Arc;

use serde_json::Value;

use corelink_utils::{CorelinkError, Result};

use crate::channel::{ObjectChannel, SignalHandle};

#[derive(Clone)]
pub struct ObjectProxy {
    channel: Arc<ObjectChannel>,
    object: String,
}

impl std::fmt::Debug for ObjectProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectProxy")
            .field("object", &self.object)
            .finish_non_exhaustive()
    }
}

impl ObjectProxy {
    pub(crate) fn new(channel: Arc<ObjectChannel>, object: String) -> Self {
        Self { channel, object }
    }

    /// Id of the remote object this proxy is bound to
    pub fn object_id(&self) -> &str {
        &self.object
    }

    /// Read a property from the local cache
    pub fn property(&self, name: &str) -> Result<Value> {
        self.channel.property(&self.object, name)
    }

    /// Request a property change; the cache updates once the server
    /// confirms
    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        self.channel.set_property(&self.object, name, value)
    }

    /// Invoke a method and wait for its result
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.channel.invoke(&self.object, method, args).await
    }

    /// Attach a callback to one of this object's signals
    pub fn subscribe(
        &self,
        signal: &str,
        callback: impl Fn(&[Value]) + Send + Sync + 'static,
    ) -> Result<SignalHandle> {
        self.channel.subscribe(&self.object, signal, callback)
    }

    /// Names of the cached properties
    pub fn property_names(&self) -> Result<Vec<String>> {
        let descriptor = self.channel.descriptor(&self.object)?;
        Ok(descriptor.properties.keys().cloned().collect())
    }

    /// Names of the callable methods
    pub fn methods(&self) -> Result<Vec<String>> {
        Ok(self.channel.descriptor(&self.object)?.methods)
    }

    /// Names of the emittable signals
    pub fn signals(&self) -> Result<Vec<String>> {
        Ok(self.channel.descriptor(&self.object)?.signals)
    }

    /// Ordinal of an enum member, looked up by name
    pub fn enum_value(&self, name: &str, member: &str) -> Result<i64> {
        let descriptor = self.channel.descriptor(&self.object)?;
        let table = descriptor
            .enums
            .get(name)
            .ok_or_else(|| CorelinkError::EnumNotFound {
                object: self.object.clone(),
                name: name.to_string(),
            })?;
        table
            .get(member)
            .copied()
            .ok_or_else(|| CorelinkError::EnumMemberNotFound {
                object: self.object.clone(),
                name: name.to_string(),
                member: member.to_string(),
            })
    }

    /// Name of an enum member, looked up by ordinal
    pub fn enum_member(&self, name: &str, ordinal: i64) -> Result<String> {
        let descriptor = self.channel.descriptor(&self.object)?;
        let table = descriptor
            .enums
            .get(name)
            .ok_or_else(|| CorelinkError::EnumNotFound {
                object: self.object.clone(),
                name: name.to_string(),
            })?;
        table
            .iter()
            .find(|(_, v)| **v == ordinal)
            .map(|(k, _)| k.clone())
            .ok_or_else(|| CorelinkError::EnumMemberNotFound {
                object: self.object.clone(),
                name: name.to_string(),
                member: ordinal.to_string(),
            })
    }
}
