//! CRUD helpers for link-negotiation records.
//!
//! The whole entry list is stored as one JSON column, so every mutation is
//! a read-modify-write of a single row keyed by recipient id.

use rusqlite::{params, OptionalExtension};

use ferry_shared::types::UserId;

use crate::database::Database;
use crate::error::Result;
use crate::models::{LinkEntry, LinkRequest};

impl Database {
    /// Fetch the negotiation record for a recipient, if one exists.
    pub fn get_link_request(&self, recipient_id: &UserId) -> Result<Option<LinkRequest>> {
        let row: Option<String> = self
            .conn()
            .query_row(
                "SELECT entries FROM link_requests WHERE recipient_id = ?1",
                params![recipient_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match row {
            Some(entries_json) => {
                let entries: Vec<LinkEntry> = serde_json::from_str(&entries_json)?;
                Ok(Some(LinkRequest {
                    recipient_id: recipient_id.clone(),
                    entries,
                }))
            }
            None => Ok(None),
        }
    }

    /// Insert or replace the negotiation record for its recipient.
    pub fn put_link_request(&self, record: &LinkRequest) -> Result<()> {
        let entries_json = serde_json::to_string(&record.entries)?;
        self.conn().execute(
            "INSERT INTO link_requests (recipient_id, entries) VALUES (?1, ?2)
             ON CONFLICT(recipient_id) DO UPDATE SET entries = excluded.entries",
            params![record.recipient_id.as_str(), entries_json],
        )?;
        Ok(())
    }

    /// Delete every negotiation record keyed by the given recipient.
    /// Returns the number of rows removed.
    pub fn delete_link_requests(&self, recipient_id: &UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM link_requests WHERE recipient_id = ?1",
            params![recipient_id.as_str()],
        )?;
        Ok(affected)
    }
}
