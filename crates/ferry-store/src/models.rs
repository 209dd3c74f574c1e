//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize`; `LinkEntry` is also
//! the on-disk shape of the `link_requests.entries` JSON column, so its
//! field names are camelCase like the wire protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ferry_shared::types::UserId;

// ---------------------------------------------------------------------------
// Link requests
// ---------------------------------------------------------------------------

/// One sender's proposal inside a recipient's negotiation record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LinkEntry {
    pub sender_id: UserId,
    /// Opaque link token proposed by the sender.
    pub link: String,
    /// Tri-state outcome: `None` while pending, then set exactly once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,
}

impl LinkEntry {
    pub fn pending(sender_id: UserId, link: impl Into<String>) -> Self {
        Self {
            sender_id,
            link: link.into(),
            accepted: None,
        }
    }
}

/// Persisted negotiation record.  Exactly one per recipient user id; the
/// entry list is ordered by arrival and is NOT deduplicated per sender.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkRequest {
    pub recipient_id: UserId,
    pub entries: Vec<LinkEntry>,
}

impl LinkRequest {
    pub fn new(recipient_id: UserId) -> Self {
        Self {
            recipient_id,
            entries: Vec::new(),
        }
    }

    /// First entry from the given sender, in arrival order.
    pub fn entry_for_sender(&self, sender_id: &UserId) -> Option<&LinkEntry> {
        self.entries.iter().find(|e| &e.sender_id == sender_id)
    }

    pub fn entry_for_sender_mut(&mut self, sender_id: &UserId) -> Option<&mut LinkEntry> {
        self.entries.iter_mut().find(|e| &e.sender_id == sender_id)
    }
}

// ---------------------------------------------------------------------------
// Transfer progress
// ---------------------------------------------------------------------------

/// Progress marker for one in-flight chunked transfer, keyed by
/// `(sender_id, recipient_id, file_name)`.  Upserted on every chunk, so at
/// most one row exists per key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferMeta {
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub file_name: String,
    /// Index of the last chunk the sender reported.
    pub current_chunk: u32,
    pub total_chunks: u32,
    /// When this row was last upserted.
    pub updated_at: DateTime<Utc>,
}
