//! Abstract management connection consumed by the monitoring engine.
//!
//! This module defines the names and values a monitored runtime exposes,
//! the `AttributeSource` read interface, and the `ManagementConnection` /
//! `ConnectionProvider` pair a transport backend has to implement. No wire
//! protocol lives here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ConnectionError, Result};

pub const MEMORY: &str = "java.lang:type=Memory";
pub const RUNTIME: &str = "java.lang:type=Runtime";
pub const THREADING: &str = "java.lang:type=Threading";
pub const CLASS_LOADING: &str = "java.lang:type=ClassLoading";
pub const OPERATING_SYSTEM: &str = "java.lang:type=OperatingSystem";
pub const GARBAGE_COLLECTOR_DOMAIN_TYPE: &str = "java.lang:type=GarbageCollector";

/// Name of a management object, `domain:key=value[,key=value...]`.
///
/// A key list of `*` or ending in `,*` turns the name into a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectName {
    raw: String,
    domain_len: usize,
}

impl ObjectName {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let domain_len = match raw.find(':') {
            Some(pos) if pos > 0 && pos + 1 < raw.len() => pos,
            _ => return Err(ConnectionError::TypeMismatch(format!("object name '{raw}'"))),
        };
        Ok(Self { raw, domain_len })
    }

    fn platform(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            domain_len: "java.lang".len(),
        }
    }

    pub fn memory() -> Self {
        Self::platform(MEMORY)
    }

    pub fn runtime() -> Self {
        Self::platform(RUNTIME)
    }

    pub fn threading() -> Self {
        Self::platform(THREADING)
    }

    pub fn class_loading() -> Self {
        Self::platform(CLASS_LOADING)
    }

    pub fn operating_system() -> Self {
        Self::platform(OPERATING_SYSTEM)
    }

    /// Pattern matching every garbage collector object.
    pub fn garbage_collectors() -> Self {
        Self::platform(&format!("{GARBAGE_COLLECTOR_DOMAIN_TYPE},*"))
    }

    pub fn garbage_collector(name: &str) -> Self {
        Self::platform(&format!("{GARBAGE_COLLECTOR_DOMAIN_TYPE},name={name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn domain(&self) -> &str {
        &self.raw[..self.domain_len]
    }

    fn key_list(&self) -> &str {
        &self.raw[self.domain_len + 1..]
    }

    fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.key_list()
            .split(',')
            .filter_map(|kv| kv.split_once('='))
    }

    pub fn key_property(&self, key: &str) -> Option<&str> {
        self.properties().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn is_pattern(&self) -> bool {
        let keys = self.key_list();
        keys == "*" || keys.ends_with(",*")
    }

    /// Returns true if `self` (a pattern or a plain name) selects `other`.
    pub fn matches(&self, other: &ObjectName) -> bool {
        if !self.is_pattern() {
            return self == other;
        }
        if self.domain() != other.domain() {
            return false;
        }
        self.properties()
            .all(|(k, v)| other.key_property(k) == Some(v))
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for ObjectName {
    type Error = ConnectionError;

    fn try_from(value: String) -> Result<Self> {
        ObjectName::new(value)
    }
}

impl From<ObjectName> for String {
    fn from(name: ObjectName) -> Self {
        name.raw
    }
}

/// Heap or non-heap usage in bytes. `max` is -1 when undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub init: i64,
    pub used: i64,
    pub committed: i64,
    pub max: i64,
}

/// Snapshot of a single thread as reported by the threading object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub thread_id: i64,
    pub thread_name: String,
    pub thread_state: String,
    /// Id of the thread owning the lock this one waits for, -1 if none.
    #[serde(default = "no_lock_owner")]
    pub lock_owner_id: i64,
}

fn no_lock_owner() -> i64 {
    -1
}

/// A value read from a management object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    Text(String),
    LongArray(Vec<i64>),
    TextArray(Vec<String>),
    Usage(MemoryUsage),
    Thread(ThreadInfo),
    Properties(BTreeMap<String, String>),
}

impl AttributeValue {
    pub fn as_long(&self, what: &str) -> Result<i64> {
        match self {
            AttributeValue::Long(v) => Ok(*v),
            _ => Err(ConnectionError::TypeMismatch(what.to_string())),
        }
    }

    pub fn as_bool(&self, what: &str) -> Result<bool> {
        match self {
            AttributeValue::Bool(v) => Ok(*v),
            _ => Err(ConnectionError::TypeMismatch(what.to_string())),
        }
    }

    pub fn into_usage(self, what: &str) -> Result<MemoryUsage> {
        match self {
            AttributeValue::Usage(u) => Ok(u),
            _ => Err(ConnectionError::TypeMismatch(what.to_string())),
        }
    }

    pub fn into_text_array(self, what: &str) -> Result<Vec<String>> {
        match self {
            AttributeValue::TextArray(v) => Ok(v),
            AttributeValue::Null => Ok(Vec::new()),
            _ => Err(ConnectionError::TypeMismatch(what.to_string())),
        }
    }

    pub fn into_properties(self, what: &str) -> Result<BTreeMap<String, String>> {
        match self {
            AttributeValue::Properties(p) => Ok(p),
            _ => Err(ConnectionError::TypeMismatch(what.to_string())),
        }
    }

    /// `Null` maps to `None`, used by operations that report "nothing found".
    pub fn into_long_array(self, what: &str) -> Result<Option<Vec<i64>>> {
        match self {
            AttributeValue::Null => Ok(None),
            AttributeValue::LongArray(v) => Ok(Some(v)),
            _ => Err(ConnectionError::TypeMismatch(what.to_string())),
        }
    }

    pub fn into_thread_info(self, what: &str) -> Result<Option<ThreadInfo>> {
        match self {
            AttributeValue::Null => Ok(None),
            AttributeValue::Thread(t) => Ok(Some(t)),
            _ => Err(ConnectionError::TypeMismatch(what.to_string())),
        }
    }
}

/// Attribute name to value, as returned by a batched read.
pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// Read access to the management objects of one monitored instance.
pub trait AttributeSource {
    fn get_attribute(&mut self, object: &ObjectName, name: &str) -> Result<AttributeValue>;

    /// Batched read. Attributes that fail individually are left out of the
    /// result instead of failing the whole call.
    fn get_attributes(&mut self, object: &ObjectName, names: &[String]) -> Result<AttributeMap>;

    /// Lists registered objects selected by `pattern`.
    fn query_names(&mut self, pattern: &ObjectName) -> Result<Vec<ObjectName>>;

    fn invoke(
        &mut self,
        object: &ObjectName,
        operation: &str,
        params: &[AttributeValue],
    ) -> Result<AttributeValue>;

    fn is_registered(&mut self, object: &ObjectName) -> Result<bool> {
        Ok(!self.query_names(object)?.is_empty())
    }
}

impl<T: AttributeSource + ?Sized> AttributeSource for Box<T> {
    fn get_attribute(&mut self, object: &ObjectName, name: &str) -> Result<AttributeValue> {
        (**self).get_attribute(object, name)
    }

    fn get_attributes(&mut self, object: &ObjectName, names: &[String]) -> Result<AttributeMap> {
        (**self).get_attributes(object, names)
    }

    fn query_names(&mut self, pattern: &ObjectName) -> Result<Vec<ObjectName>> {
        (**self).query_names(pattern)
    }

    fn invoke(
        &mut self,
        object: &ObjectName,
        operation: &str,
        params: &[AttributeValue],
    ) -> Result<AttributeValue> {
        (**self).invoke(object, operation, params)
    }
}

/// A live management connection to one instance.
pub trait ManagementConnection: AttributeSource + Send {
    /// Transport-level liveness; false once the peer is gone.
    fn is_alive(&mut self) -> bool;

    fn close(&mut self);
}

/// Where and how to reach an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Local {
        pid: u32,
    },
    Remote {
        host: String,
        port: u16,
        user: Option<String>,
        #[serde(skip_serializing)]
        password: Option<String>,
    },
    Url {
        url: String,
        user: Option<String>,
        #[serde(skip_serializing)]
        password: Option<String>,
    },
}

impl Endpoint {
    pub fn connection_name(&self) -> String {
        match self {
            Endpoint::Local { pid } => pid.to_string(),
            Endpoint::Remote { host, port, user, .. } => match user.as_deref() {
                Some(u) if !u.is_empty() => format!("{u}@{host}:{port}"),
                _ => format!("{host}:{port}"),
            },
            Endpoint::Url { url, user, .. } => match user.as_deref() {
                Some(u) if !u.is_empty() => format!("{u}@{url}"),
                _ => url.clone(),
            },
        }
    }
}

/// Opens management connections. Supplied by the transport backend.
pub trait ConnectionProvider {
    fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn ManagementConnection>>;
}
