use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use uuid::Uuid;

use natter_types::events::GatewayEvent;

/// Push side of one live gateway connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl ConnectionHandle {
    /// Creates a handle with a fresh connection id and the receiving end
    /// the connection loop drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            conn_id: Uuid::new_v4(),
            tx,
        };
        (handle, rx)
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Queues an event without waiting. Returns false if the connection is gone.
    pub fn push(&self, event: GatewayEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Maps each user to at most one live connection.
///
/// Lives for the whole process and is shared by cloning. All operations take
/// the lock for a short, non-async critical section.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<PresenceMap>>,
}

#[derive(Default)]
struct PresenceMap {
    by_user: HashMap<Uuid, ConnectionHandle>,
    by_conn: HashMap<Uuid, Uuid>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `user_id` to `handle`, returning the handle it replaced.
    ///
    /// Dropping the returned handle releases the old connection's sender,
    /// which ends that connection's push loop.
    pub fn register(&self, user_id: Uuid, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let mut map = self.write();
        map.by_conn.insert(handle.conn_id, user_id);
        let previous = map.by_user.insert(user_id, handle);
        if let Some(prev) = &previous {
            map.by_conn.remove(&prev.conn_id);
        }
        previous
    }

    /// Removes the entry owned by `conn_id`, if it is still the current one.
    /// Returns the user that went offline.
    pub fn unregister(&self, conn_id: Uuid) -> Option<Uuid> {
        let mut map = self.write();
        let user_id = map.by_conn.remove(&conn_id)?;
        match map.by_user.get(&user_id) {
            Some(current) if current.conn_id == conn_id => {
                map.by_user.remove(&user_id);
                Some(user_id)
            }
            _ => None,
        }
    }

    pub fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.read().by_user.get(&user_id).cloned()
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.read().by_user.contains_key(&user_id)
    }

    pub fn online_users(&self) -> Vec<Uuid> {
        self.read().by_user.keys().copied().collect()
    }

    /// Every live handle, for fan-out to all clients.
    pub fn handles(&self) -> Vec<ConnectionHandle> {
        self.read().by_user.values().cloned().collect()
    }

    // Critical sections never panic, so a poisoned lock still holds a
    // consistent map.
    fn read(&self) -> RwLockReadGuard<'_, PresenceMap> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, PresenceMap> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}
