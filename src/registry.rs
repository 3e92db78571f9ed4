//! Registry of connection sessions, one per instance identity.
//!
//! The registry is owned by the monitor and passed to whatever needs to look
//! up a session. `attach` is lookup-or-create, which is what guarantees that
//! an instance never gets a second connection.

use ahash::AHashMap as HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::connection::Endpoint;
use crate::discovery::InstanceId;
use crate::session::{lock_session, ConnectionSession, SharedSession};

#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<InstanceId, SharedSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for `id`, creating it in `Init` if needed.
    pub fn attach(&mut self, id: InstanceId, endpoint: &Endpoint) -> SharedSession {
        let session = self.sessions.entry(id).or_insert_with(|| {
            debug!("Creating session for instance {}", id);
            Arc::new(Mutex::new(ConnectionSession::new(id, endpoint.clone())))
        });
        Arc::clone(session)
    }

    pub fn get(&self, id: InstanceId) -> Option<SharedSession> {
        self.sessions.get(&id).cloned()
    }

    /// Closes and forgets the session of `id`. A later `attach` creates a
    /// fresh one.
    pub fn teardown(&mut self, id: InstanceId) -> bool {
        match self.sessions.remove(&id) {
            Some(session) => {
                lock_session(&session).close();
                true
            }
            None => false,
        }
    }

    /// Closes every session.
    pub fn close_all(&mut self) {
        for (_, session) in self.sessions.drain() {
            lock_session(&session).close();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ConnectionState;

    fn local(pid: u32) -> Endpoint {
        Endpoint::Local { pid }
    }

    #[test]
    fn test_attach_returns_same_session() {
        let mut registry = SessionRegistry::new();
        let a = registry.attach(InstanceId(10), &local(10));
        let b = registry.attach(InstanceId(10), &local(10));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_identities_get_distinct_sessions() {
        let mut registry = SessionRegistry::new();
        let a = registry.attach(InstanceId(10), &local(10));
        let b = registry.attach(InstanceId(11), &local(11));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_teardown_detaches_and_forgets() {
        let mut registry = SessionRegistry::new();
        let old = registry.attach(InstanceId(10), &local(10));
        assert!(registry.teardown(InstanceId(10)));
        assert_eq!(lock_session(&old).state(), ConnectionState::Detached);
        assert!(registry.get(InstanceId(10)).is_none());

        let fresh = registry.attach(InstanceId(10), &local(10));
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert!(!registry.teardown(InstanceId(99)));
    }
}
