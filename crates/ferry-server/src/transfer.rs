//! Transfer relay.
//!
//! Chunks are relayed, never stored: the only durable state is one
//! progress marker per (sender, recipient, file) key, upserted on every
//! chunk so an interrupted transfer can be resumed after a reconnect.
//! A chunk is forwarded only when the recipient's negotiation record
//! shows an accepted link from the sender; everything else is withheld
//! silently, which is denial, not an error.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use ferry_shared::protocol::{FileChunk, IncomingFileChunk, ServerEvent, TransferSnapshot};
use ferry_shared::types::UserId;
use ferry_store::{Database, TransferMeta};

use crate::registry::{ConnectionHandle, ConnectionRegistry};

pub struct TransferRelay {
    registry: ConnectionRegistry,
    db: Arc<Mutex<Database>>,
}

impl TransferRelay {
    pub fn new(registry: ConnectionRegistry, db: Arc<Mutex<Database>>) -> Self {
        Self { registry, db }
    }

    /// Record progress for one chunk, then forward it to the recipient iff
    /// the recipient previously accepted a link from this sender.
    ///
    /// The progress upsert and the acceptance read are separate store
    /// round-trips; a response racing in between may be observed by one
    /// and not the other.
    pub async fn send_chunk(&self, sender_id: &UserId, chunk: FileChunk) {
        let meta = TransferMeta {
            sender_id: sender_id.clone(),
            recipient_id: chunk.recipient_id.clone(),
            file_name: chunk.file_name.clone(),
            current_chunk: chunk.chunk_index,
            total_chunks: chunk.total_chunks,
            updated_at: Utc::now(),
        };

        {
            let db = self.db.lock().await;
            if let Err(e) = db.upsert_transfer_meta(&meta) {
                warn!(
                    sender = %sender_id,
                    recipient = %chunk.recipient_id,
                    file = %chunk.file_name,
                    error = %e,
                    "failed to persist transfer progress, dropping chunk"
                );
                return;
            }
        }

        let accepted = {
            let db = self.db.lock().await;
            match db.get_link_request(&chunk.recipient_id) {
                Ok(record) => record
                    .and_then(|r| r.entry_for_sender(sender_id).and_then(|e| e.accepted))
                    .unwrap_or(false),
                Err(e) => {
                    warn!(
                        recipient = %chunk.recipient_id,
                        error = %e,
                        "failed to read negotiation record, dropping chunk"
                    );
                    return;
                }
            }
        };

        if !accepted {
            debug!(
                sender = %sender_id,
                recipient = %chunk.recipient_id,
                "withholding chunk without an accepted link"
            );
            return;
        }

        let recipient_conn = self.registry.lookup(&chunk.recipient_id).await;
        match recipient_conn {
            Some(conn) => {
                conn.push(ServerEvent::FileChunkReceived(IncomingFileChunk {
                    file_name: chunk.file_name,
                    chunk_data: chunk.chunk_data,
                    chunk_index: chunk.chunk_index,
                }));
            }
            None => {
                debug!(recipient = %chunk.recipient_id, "recipient not connected, chunk dropped");
            }
        }
    }

    /// Clear every progress marker for `(recipient, file)`, across all
    /// senders.
    pub async fn complete_transfer(&self, recipient_id: &UserId, file_name: &str) {
        let db = self.db.lock().await;
        match db.delete_transfer_meta(recipient_id, file_name) {
            Ok(n) => debug!(
                recipient = %recipient_id,
                file = %file_name,
                records = n,
                "transfer completed"
            ),
            Err(e) => warn!(
                recipient = %recipient_id,
                file = %file_name,
                error = %e,
                "failed to clear transfer progress"
            ),
        }
    }

    /// Reply to the querying connection with resumable progress for the
    /// pair, if any.  Absence sends nothing.
    pub async fn check_resume(
        &self,
        recipient_id: &UserId,
        sender_id: &UserId,
        reply_to: &ConnectionHandle,
    ) {
        let found = {
            let db = self.db.lock().await;
            match db.find_transfer_meta(sender_id, recipient_id) {
                Ok(found) => found,
                Err(e) => {
                    warn!(
                        sender = %sender_id,
                        recipient = %recipient_id,
                        error = %e,
                        "failed to look up transfer progress"
                    );
                    return;
                }
            }
        };

        if let Some(meta) = found {
            reply_to.push(ServerEvent::ResumeFileTransfer(TransferSnapshot {
                sender_id: meta.sender_id,
                recipient_id: meta.recipient_id,
                file_name: meta.file_name,
                current_chunk: meta.current_chunk,
                total_chunks: meta.total_chunks,
            }));
        }
    }
}
