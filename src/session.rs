//! Connection session: lifecycle of the management connection to one instance.
//!
//! A session owns the live connection (wrapped in a `SnapshotCache`), the
//! endpoint needed to open it and the current `ConnectionState`. Every state
//! change goes through `ConnectionState::transition`; entering a terminal
//! state closes the connection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::beans::ThreadingBean;
use crate::connection::{ConnectionProvider, Endpoint, ManagementConnection, ObjectName};
use crate::discovery::InstanceId;
use crate::error::{ConnectionError, MonitorError};
use crate::snapshot::SnapshotCache;
use crate::state::{ConnectionState, SessionEvent};

pub type CachedConnection = SnapshotCache<Box<dyn ManagementConnection>>;

/// Session handle shared between the registry and the instance using it.
pub type SharedSession = Arc<Mutex<ConnectionSession>>;

/// Locks a shared session. A panic while holding the lock leaves the session
/// data intact, so a poisoned lock is still usable.
pub fn lock_session(session: &SharedSession) -> MutexGuard<'_, ConnectionSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ConnectionSession {
    id: InstanceId,
    endpoint: Endpoint,
    state: ConnectionState,
    connection: Option<CachedConnection>,
    supports_lock_usage: bool,
}

impl ConnectionSession {
    pub fn new(id: InstanceId, endpoint: Endpoint) -> Self {
        Self {
            id,
            endpoint,
            state: ConnectionState::Init,
            connection: None,
            supports_lock_usage: false,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True if the instance can detect deadlocks on ownable synchronizers.
    pub fn supports_lock_usage(&self) -> bool {
        self.supports_lock_usage
    }

    /// Feeds `event` through the state machine and returns the new state.
    pub fn apply(&mut self, event: SessionEvent) -> ConnectionState {
        let next = self.state.transition(event);
        if next != self.state {
            debug!("Instance {}: {} -> {} ({:?})", self.id, self.state, next, event);
            self.state = next;
            if next.is_terminal() {
                self.disconnect();
            }
        }
        next
    }

    /// Records that the instance is known to be not attachable.
    pub fn mark_not_attachable(&mut self) -> ConnectionState {
        self.apply(SessionEvent::AttachFailed)
    }

    /// Opens the connection. Only acts in `Init`; later calls report the
    /// outcome of the first attempt without retrying.
    pub fn connect(&mut self, provider: &dyn ConnectionProvider) -> Result<(), MonitorError> {
        if self.state != ConnectionState::Init {
            return self.outcome();
        }
        self.apply(SessionEvent::ConnectStarted);

        let mut conn = match provider.open(&self.endpoint) {
            Ok(conn) => conn,
            Err(e) => return Err(self.attach_failed(e)),
        };

        if !conn.is_alive() {
            debug!("Instance {}: connection dead right after attach", self.id);
            conn.close();
            self.apply(SessionEvent::LivenessLost);
            return Err(MonitorError::PermanentDetach { id: self.id });
        }

        match check_liveness(conn.as_mut()) {
            Ok(supports_lock_usage) => self.supports_lock_usage = supports_lock_usage,
            Err(e) => {
                conn.close();
                return Err(self.attach_failed(e));
            }
        }

        self.connection = Some(SnapshotCache::new(conn));
        self.apply(SessionEvent::Connected);
        info!(
            "Attached to instance {} ({})",
            self.id,
            self.endpoint.connection_name()
        );
        Ok(())
    }

    fn attach_failed(&mut self, error: ConnectionError) -> MonitorError {
        if error.is_refusal() {
            debug!("Instance {}: connection refused: {}", self.id, error);
            self.apply(SessionEvent::Refused);
            MonitorError::ConnectionRefused {
                id: self.id,
                source: error,
            }
        } else {
            warn!("Instance {}: could not attach: {}", self.id, error);
            self.apply(SessionEvent::AttachFailed);
            MonitorError::AttachFailure {
                id: self.id,
                source: error,
            }
        }
    }

    fn outcome(&self) -> Result<(), MonitorError> {
        match self.state {
            ConnectionState::Detached => Err(MonitorError::PermanentDetach { id: self.id }),
            ConnectionState::ConnectionRefused => Err(MonitorError::ConnectionRefused {
                id: self.id,
                source: ConnectionError::Refused(self.endpoint.connection_name()),
            }),
            ConnectionState::ErrorDuringAttach => Err(MonitorError::AttachFailure {
                id: self.id,
                source: ConnectionError::NotManageable(self.endpoint.connection_name()),
            }),
            _ => Ok(()),
        }
    }

    /// Asks the transport whether the peer is still there. Losing it moves
    /// the session to `Detached` for good.
    pub fn is_live(&mut self) -> bool {
        let alive = self
            .connection
            .as_mut()
            .is_some_and(|conn| conn.inner_mut().is_alive());
        if !alive && !self.state.is_terminal() {
            self.apply(SessionEvent::LivenessLost);
        }
        alive
    }

    /// Cached attribute source for the current cycle, if connected.
    pub fn source(&mut self) -> Option<&mut CachedConnection> {
        self.connection.as_mut()
    }

    /// Starts a new poll cycle: drops all cached attribute values.
    pub fn flush(&mut self) {
        if let Some(conn) = self.connection.as_mut() {
            conn.flush();
        }
    }

    /// Tears the session down permanently.
    pub fn close(&mut self) {
        self.apply(SessionEvent::LivenessLost);
        self.disconnect();
    }

    fn disconnect(&mut self) {
        if let Some(mut conn) = self.connection.take() {
            conn.inner_mut().close();
        }
    }
}

/// Checks that the platform objects are reachable and whether full deadlock
/// detection is available.
fn check_liveness(conn: &mut dyn ManagementConnection) -> Result<bool, ConnectionError> {
    let threading = ObjectName::threading();
    if !conn.is_registered(&threading)? {
        return Err(ConnectionError::NotManageable(format!(
            "{} is not registered",
            threading
        )));
    }
    Ok(conn.is_synchronizer_usage_supported().unwrap_or(false))
}
