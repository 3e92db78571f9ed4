//! Error types for the monitoring engine.
//!
//! `ConnectionError` describes what went wrong on a single management
//! connection. `MonitorError` classifies failures the way the poll loop
//! treats them: per-instance failures are recorded and never abort the loop,
//! only an unusable discovery provider is fatal.

use thiserror::Error;

use crate::connection::ObjectName;
use crate::discovery::InstanceId;

/// Failure reported by a management connection or its provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("connection refused: {0}")]
    Refused(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("attach not supported: {0}")]
    AttachNotSupported(String),

    #[error("instance is not manageable: {0}")]
    NotManageable(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("management object not registered: {0}")]
    InstanceNotFound(ObjectName),

    #[error("attribute {attribute} of {object} could not be read: {reason}")]
    Attribute {
        object: ObjectName,
        attribute: String,
        reason: String,
    },

    #[error("operation {operation} not supported by {object}")]
    UnsupportedOperation { object: ObjectName, operation: String },

    #[error("unexpected value type for {0}")]
    TypeMismatch(String),

    #[error("connection closed")]
    Closed,
}

impl ConnectionError {
    /// Returns true for failures that mean the peer rejected us.
    ///
    /// Refusals are not retried for the rest of the run.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            ConnectionError::Refused(_)
                | ConnectionError::PermissionDenied(_)
                | ConnectionError::AttachNotSupported(_)
        )
    }
}

/// Failure classes as seen by the monitoring loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    #[error("could not attach to instance {id}: {source}")]
    AttachFailure {
        id: InstanceId,
        #[source]
        source: ConnectionError,
    },

    #[error("connection to instance {id} refused: {source}")]
    ConnectionRefused {
        id: InstanceId,
        #[source]
        source: ConnectionError,
    },

    #[error("could not fetch metrics of instance {id} ({count} consecutive failures): {source}")]
    TransientUpdateFailure {
        id: InstanceId,
        count: u32,
        #[source]
        source: ConnectionError,
    },

    #[error("instance {id} detached")]
    PermanentDetach { id: InstanceId },

    #[error("attribute {attribute} of {object} could not be read")]
    PartialAttributeFailure { object: ObjectName, attribute: String },

    #[error("discovery provider failed: {0}")]
    Discovery(String),
}

impl MonitorError {
    /// Only discovery failures stop the poll loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MonitorError::Discovery(_))
    }
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
