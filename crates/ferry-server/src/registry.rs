//! In-memory index from user id to its live connection.
//!
//! The registry is the only mutable structure shared between connection
//! handlers; every mutation goes through its operations, which are
//! linearizable behind one `RwLock`.  A reverse index from connection id
//! lets disconnects evict in O(1) instead of scanning the user map by
//! value.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use ferry_shared::protocol::ServerEvent;
use ferry_shared::types::{ConnectionId, UserId};

/// Outbound frames queued per connection before its writer task drains
/// them.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Sending half of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<ServerEvent>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an event for delivery.  Returns `false` when the outbound
    /// queue is full or the connection is gone; the frame is dropped
    /// either way (at-most-once, best-effort).
    pub fn push(&self, event: ServerEvent) -> bool {
        if self.tx.try_send(event).is_err() {
            debug!(
                connection = %self.id.short(),
                "dropping frame for slow or closed connection"
            );
            return false;
        }
        true
    }
}

struct RegistryInner {
    by_user: HashMap<UserId, ConnectionHandle>,
    by_conn: HashMap<ConnectionId, UserId>,
}

#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner {
                by_user: HashMap::new(),
                by_conn: HashMap::new(),
            })),
        }
    }

    /// Insert or replace the mapping for `user_id`.
    pub async fn register(&self, user_id: UserId, handle: ConnectionHandle) {
        let mut inner = self.inner.write().await;

        // A connection re-registering under a new id abandons its old one.
        if let Some(old_user) = inner.by_conn.insert(handle.id(), user_id.clone()) {
            if old_user != user_id {
                inner.by_user.remove(&old_user);
            }
        }

        if let Some(previous) = inner.by_user.insert(user_id.clone(), handle.clone()) {
            if previous.id() != handle.id() {
                inner.by_conn.remove(&previous.id());
            }
        }

        info!(user = %user_id, connection = %handle.id().short(), "user registered");
    }

    pub async fn lookup(&self, user_id: &UserId) -> Option<ConnectionHandle> {
        self.inner.read().await.by_user.get(user_id).cloned()
    }

    /// Evict by connection id, returning the owning user id.
    ///
    /// A connection whose registration was already replaced by a newer one
    /// returns `None`: the user is still connected elsewhere and must not
    /// be evicted or purged on its behalf.
    pub async fn remove_by_connection(&self, connection_id: ConnectionId) -> Option<UserId> {
        let mut inner = self.inner.write().await;
        let user_id = inner.by_conn.remove(&connection_id)?;
        if inner
            .by_user
            .get(&user_id)
            .is_some_and(|h| h.id() == connection_id)
        {
            inner.by_user.remove(&user_id);
        }
        Some(user_id)
    }

    pub async fn connected_users(&self) -> usize {
        self.inner.read().await.by_user.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnectionHandle, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(8);
        (ConnectionHandle::new(ConnectionId::new(), tx), rx)
    }

    #[tokio::test]
    async fn test_register_lookup_remove() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = handle();
        let alice = UserId::from("alice");

        registry.register(alice.clone(), conn.clone()).await;
        assert_eq!(registry.lookup(&alice).await.unwrap().id(), conn.id());

        let evicted = registry.remove_by_connection(conn.id()).await;
        assert_eq!(evicted, Some(alice.clone()));
        assert!(registry.lookup(&alice).await.is_none());
    }

    #[tokio::test]
    async fn test_register_replaces_previous_connection() {
        let registry = ConnectionRegistry::new();
        let (old, _rx1) = handle();
        let (new, _rx2) = handle();
        let alice = UserId::from("alice");

        registry.register(alice.clone(), old.clone()).await;
        registry.register(alice.clone(), new.clone()).await;

        assert_eq!(registry.lookup(&alice).await.unwrap().id(), new.id());

        // The stale connection's disconnect must not evict the newer
        // registration.
        assert_eq!(registry.remove_by_connection(old.id()).await, None);
        assert_eq!(registry.lookup(&alice).await.unwrap().id(), new.id());

        assert_eq!(
            registry.remove_by_connection(new.id()).await,
            Some(alice.clone())
        );
        assert!(registry.lookup(&alice).await.is_none());
    }

    #[tokio::test]
    async fn test_connection_reregistering_abandons_old_user() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = handle();

        registry.register(UserId::from("alice"), conn.clone()).await;
        registry.register(UserId::from("bob"), conn.clone()).await;

        assert!(registry.lookup(&UserId::from("alice")).await.is_none());
        assert_eq!(
            registry.remove_by_connection(conn.id()).await,
            Some(UserId::from("bob"))
        );
        assert_eq!(registry.connected_users().await, 0);
    }

    #[tokio::test]
    async fn test_push_delivers_event() {
        let (conn, mut rx) = handle();
        let event = ServerEvent::LinkAccepted(ferry_shared::protocol::LinkOutcome {
            from: UserId::from("alice"),
        });

        assert!(conn.push(event.clone()));
        assert_eq!(rx.try_recv().unwrap(), event);
    }
}
