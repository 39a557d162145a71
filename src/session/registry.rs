use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Bookkeeping for one open connection.
#[derive(Clone, Debug)]
pub struct SessionInfo {
    pub id: u64,
    pub peer: Option<String>,
    pub opened_at: Instant,
}

/// Set of active sessions, owned by the server.
///
/// Sessions enter through `open` and leave when their `SessionGuard` drops, so
/// a session that ends by error or cancellation is still removed.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: Mutex<HashMap<u64, SessionInfo>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(self: &Arc<Self>, peer: Option<String>) -> SessionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let info = SessionInfo {
            id,
            peer,
            opened_at: Instant::now(),
        };
        let active = {
            let mut sessions = self.lock();
            sessions.insert(id, info);
            sessions.len()
        };
        log::debug!("session {} registered ({} active)", id, active);
        SessionGuard {
            id,
            registry: Arc::clone(self),
        }
    }

    pub fn active(&self) -> usize {
        self.lock().len()
    }

    /// Snapshot of open sessions ordered by id.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self.lock().values().cloned().collect();
        sessions.sort_by_key(|info| info.id);
        sessions
    }

    fn remove(&self, id: u64) {
        let active = {
            let mut sessions = self.lock();
            sessions.remove(&id);
            sessions.len()
        };
        log::debug!("session {} unregistered ({} active)", id, active);
    }

    // A panic while holding the lock leaves the map itself consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, SessionInfo>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps a session registered until dropped.
pub struct SessionGuard {
    id: u64,
    registry: Arc<ConnectionRegistry>,
}

impl SessionGuard {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
