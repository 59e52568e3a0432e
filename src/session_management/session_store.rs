//! Session Store
//!
//! Process-wide map from session id to [`Session`]. Each call is atomic on
//! the whole map; reads for one id are safe while other ids are being
//! connected or disconnected.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::session_management::session::{Session, SessionId};

/// Injectable session state, keyed by [`SessionId`].
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &SessionId) -> Option<Session>;

    /// Inserts or replaces the session under its own id.
    fn put(&self, session: Session);

    /// Removes and returns the session, if it was present.
    fn delete(&self, id: &SessionId) -> Option<Session>;

    fn ids(&self) -> Vec<SessionId>;

    fn len(&self) -> usize {
        self.ids().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store; sessions do not survive a restart.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionId, Session>> {
        match self.sessions.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, Session>> {
        match self.sessions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, id: &SessionId) -> Option<Session> {
        self.read().get(id).cloned()
    }

    fn put(&self, session: Session) {
        self.write().insert(session.id.clone(), session);
    }

    fn delete(&self, id: &SessionId) -> Option<Session> {
        self.write().remove(id)
    }

    fn ids(&self) -> Vec<SessionId> {
        self.read().keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_management::session::TransportMode;
    use chrono::Utc;

    fn session() -> Session {
        Session {
            id: SessionId::generate(),
            host_address: "10.0.0.5".into(),
            transport_mode: TransportMode::Plain,
            connection_endpoint: "http://10.0.0.5:2376".into(),
            credential_ref: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_put_get_delete() {
        let store = MemorySessionStore::new();
        let s = session();
        store.put(s.clone());

        assert_eq!(store.get(&s.id), Some(s.clone()));
        assert_eq!(store.ids(), vec![s.id.clone()]);
        assert_eq!(store.delete(&s.id), Some(s.clone()));
        assert!(store.get(&s.id).is_none());
        assert!(store.delete(&s.id).is_none());
        assert!(store.is_empty());
    }
}
