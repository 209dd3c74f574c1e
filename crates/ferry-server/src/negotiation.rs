//! Link negotiation service.
//!
//! Tracks one state machine per (sender, recipient) pair: an entry is
//! appended as pending, then moved to accepted or declined exactly once.
//! Delivery in both directions is at-most-once and best-effort; store
//! failures are logged and the triggering event dropped, with nothing
//! surfaced to either peer.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use ferry_shared::protocol::{IncomingLinkRequest, LinkOutcome, ServerEvent};
use ferry_shared::types::UserId;
use ferry_store::{Database, LinkEntry, LinkRequest, StoreError};

use crate::registry::ConnectionRegistry;

pub struct LinkNegotiation {
    registry: ConnectionRegistry,
    db: Arc<Mutex<Database>>,
}

impl LinkNegotiation {
    pub fn new(registry: ConnectionRegistry, db: Arc<Mutex<Database>>) -> Self {
        Self { registry, db }
    }

    /// Propose a link from `from` to `to`.
    ///
    /// Forwards `link-request` to the recipient when connected, and
    /// appends a pending entry to the recipient's persisted record
    /// regardless of delivery.
    pub async fn request_link(&self, from: &UserId, to: &UserId, link: &str) {
        if let Some(conn) = self.registry.lookup(to).await {
            conn.push(ServerEvent::LinkRequest(IncomingLinkRequest {
                from: from.clone(),
                link: link.to_string(),
            }));
        } else {
            debug!(from = %from, to = %to, "link request target not connected");
        }

        if let Err(e) = self.append_entry(from, to, link).await {
            warn!(from = %from, to = %to, error = %e, "failed to persist link request");
        }
    }

    async fn append_entry(&self, from: &UserId, to: &UserId, link: &str) -> Result<(), StoreError> {
        let db = self.db.lock().await;
        let mut record = db
            .get_link_request(to)?
            .unwrap_or_else(|| LinkRequest::new(to.clone()));
        // Repeated proposals from the same sender stay separate entries;
        // responses bind to the earliest one.
        record.entries.push(LinkEntry::pending(from.clone(), link));
        db.put_link_request(&record)
    }

    /// Record the recipient's answer and notify the requester when
    /// connected.
    ///
    /// `from` is the original requester, `to` the answering recipient.  A
    /// missing record or entry makes the whole call a no-op: nothing is
    /// persisted and nothing is delivered.
    pub async fn respond_to_link(&self, from: &UserId, to: &UserId, accepted: bool) {
        match self.record_response(from, to, accepted).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(from = %from, to = %to, "link response without a matching entry");
                return;
            }
            Err(e) => {
                warn!(from = %from, to = %to, error = %e, "failed to persist link response");
                return;
            }
        }

        let outcome = LinkOutcome { from: from.clone() };
        let event = if accepted {
            ServerEvent::LinkAccepted(outcome)
        } else {
            ServerEvent::LinkDeclined(outcome)
        };

        if let Some(conn) = self.registry.lookup(from).await {
            conn.push(event);
        } else {
            // The requester only learns the outcome while connected.
            debug!(requester = %from, "requester offline, dropping link outcome");
        }
    }

    async fn record_response(
        &self,
        from: &UserId,
        to: &UserId,
        accepted: bool,
    ) -> Result<bool, StoreError> {
        let db = self.db.lock().await;
        let Some(mut record) = db.get_link_request(to)? else {
            return Ok(false);
        };
        let Some(entry) = record.entry_for_sender_mut(from) else {
            return Ok(false);
        };
        entry.accepted = Some(accepted);
        db.put_link_request(&record)?;
        Ok(true)
    }

    /// Discard all negotiation records keyed by a departed recipient.
    pub async fn purge_user(&self, user_id: &UserId) {
        let db = self.db.lock().await;
        match db.delete_link_requests(user_id) {
            Ok(0) => {}
            Ok(n) => debug!(user = %user_id, records = n, "purged link requests"),
            Err(e) => warn!(user = %user_id, error = %e, "failed to purge link requests"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::mpsc;

    use ferry_shared::types::ConnectionId;

    use crate::registry::ConnectionHandle;

    struct Fixture {
        _dir: tempfile::TempDir,
        registry: ConnectionRegistry,
        service: LinkNegotiation,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Mutex::new(
            Database::open_at(&dir.path().join("test.db")).unwrap(),
        ));
        let registry = ConnectionRegistry::new();
        let service = LinkNegotiation::new(registry.clone(), db);
        Fixture {
            _dir: dir,
            registry,
            service,
        }
    }

    fn handle() -> (ConnectionHandle, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(8);
        (ConnectionHandle::new(ConnectionId::new(), tx), rx)
    }

    async fn pending_link(fx: &Fixture, from: &str, to: &str, link: &str) {
        fx.service
            .request_link(&UserId::from(from), &UserId::from(to), link)
            .await;
    }

    #[tokio::test]
    async fn test_request_forwards_and_persists() {
        let fx = fixture();
        let (bob_conn, mut bob_rx) = handle();
        fx.registry.register(UserId::from("bob"), bob_conn).await;

        pending_link(&fx, "alice", "bob", "L1").await;

        assert_eq!(
            bob_rx.try_recv().unwrap(),
            ServerEvent::LinkRequest(IncomingLinkRequest {
                from: UserId::from("alice"),
                link: "L1".to_string(),
            })
        );
        // Exactly one notification.
        assert!(bob_rx.try_recv().is_err());

        let db = fx.service.db.lock().await;
        let record = db.get_link_request(&UserId::from("bob")).unwrap().unwrap();
        assert_eq!(record.entries.len(), 1);
        assert_eq!(record.entries[0].sender_id, UserId::from("alice"));
        assert_eq!(record.entries[0].accepted, None);
    }

    #[tokio::test]
    async fn test_request_persists_even_when_target_offline() {
        let fx = fixture();

        pending_link(&fx, "alice", "bob", "L1").await;

        let db = fx.service.db.lock().await;
        let record = db.get_link_request(&UserId::from("bob")).unwrap().unwrap();
        assert_eq!(record.entries[0].link, "L1");
    }

    #[tokio::test]
    async fn test_accept_updates_entry_and_notifies_requester() {
        let fx = fixture();
        let (alice_conn, mut alice_rx) = handle();
        fx.registry
            .register(UserId::from("alice"), alice_conn)
            .await;

        pending_link(&fx, "alice", "bob", "L1").await;
        fx.service
            .respond_to_link(&UserId::from("alice"), &UserId::from("bob"), true)
            .await;

        assert_eq!(
            alice_rx.try_recv().unwrap(),
            ServerEvent::LinkAccepted(LinkOutcome {
                from: UserId::from("alice"),
            })
        );

        let db = fx.service.db.lock().await;
        let record = db.get_link_request(&UserId::from("bob")).unwrap().unwrap();
        assert_eq!(record.entries[0].accepted, Some(true));
    }

    #[tokio::test]
    async fn test_decline_notifies_with_declined_event() {
        let fx = fixture();
        let (alice_conn, mut alice_rx) = handle();
        fx.registry
            .register(UserId::from("alice"), alice_conn)
            .await;

        pending_link(&fx, "alice", "bob", "L1").await;
        fx.service
            .respond_to_link(&UserId::from("alice"), &UserId::from("bob"), false)
            .await;

        assert_eq!(
            alice_rx.try_recv().unwrap(),
            ServerEvent::LinkDeclined(LinkOutcome {
                from: UserId::from("alice"),
            })
        );
    }

    #[tokio::test]
    async fn test_response_with_offline_requester_still_persists() {
        let fx = fixture();

        pending_link(&fx, "alice", "bob", "L1").await;
        fx.service
            .respond_to_link(&UserId::from("alice"), &UserId::from("bob"), true)
            .await;

        let db = fx.service.db.lock().await;
        let record = db.get_link_request(&UserId::from("bob")).unwrap().unwrap();
        assert_eq!(record.entries[0].accepted, Some(true));
    }

    #[tokio::test]
    async fn test_response_without_entry_is_a_noop() {
        let fx = fixture();
        let (alice_conn, mut alice_rx) = handle();
        fx.registry
            .register(UserId::from("alice"), alice_conn)
            .await;

        fx.service
            .respond_to_link(&UserId::from("alice"), &UserId::from("bob"), true)
            .await;

        assert!(alice_rx.try_recv().is_err());
        let db = fx.service.db.lock().await;
        assert!(db.get_link_request(&UserId::from("bob")).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_response_binds_to_earliest_entry_from_sender() {
        let fx = fixture();

        pending_link(&fx, "alice", "bob", "L1").await;
        pending_link(&fx, "alice", "bob", "L2").await;
        fx.service
            .respond_to_link(&UserId::from("alice"), &UserId::from("bob"), true)
            .await;

        let db = fx.service.db.lock().await;
        let record = db.get_link_request(&UserId::from("bob")).unwrap().unwrap();
        assert_eq!(record.entries[0].accepted, Some(true));
        assert_eq!(record.entries[1].accepted, None);
    }

    #[tokio::test]
    async fn test_purge_discards_pending_state() {
        let fx = fixture();

        pending_link(&fx, "alice", "bob", "L1").await;
        fx.service.purge_user(&UserId::from("bob")).await;

        {
            let db = fx.service.db.lock().await;
            assert!(db.get_link_request(&UserId::from("bob")).unwrap().is_none());
        }

        // A replayed response after the purge is a no-op.
        fx.service
            .respond_to_link(&UserId::from("alice"), &UserId::from("bob"), true)
            .await;
        let db = fx.service.db.lock().await;
        assert!(db.get_link_request(&UserId::from("bob")).unwrap().is_none());
    }
}
