//! CRUD helpers for transfer-progress markers.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use ferry_shared::types::UserId;

use crate::database::Database;
use crate::error::Result;
use crate::models::TransferMeta;

impl Database {
    /// Insert or overwrite the progress row for the record's
    /// `(sender, recipient, file)` key.  Last write wins.
    pub fn upsert_transfer_meta(&self, meta: &TransferMeta) -> Result<()> {
        self.conn().execute(
            "INSERT INTO transfer_meta
                 (sender_id, recipient_id, file_name, current_chunk, total_chunks, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(sender_id, recipient_id, file_name) DO UPDATE SET
                 current_chunk = excluded.current_chunk,
                 total_chunks  = excluded.total_chunks,
                 updated_at    = excluded.updated_at",
            params![
                meta.sender_id.as_str(),
                meta.recipient_id.as_str(),
                meta.file_name,
                meta.current_chunk,
                meta.total_chunks,
                meta.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// First progress row for a `(sender, recipient)` pair, in insertion
    /// order.  The pair may have rows for several files; resume queries do
    /// not name the file.
    pub fn find_transfer_meta(
        &self,
        sender_id: &UserId,
        recipient_id: &UserId,
    ) -> Result<Option<TransferMeta>> {
        let row = self
            .conn()
            .query_row(
                "SELECT sender_id, recipient_id, file_name, current_chunk, total_chunks, updated_at
                 FROM transfer_meta
                 WHERE sender_id = ?1 AND recipient_id = ?2
                 ORDER BY rowid
                 LIMIT 1",
                params![sender_id.as_str(), recipient_id.as_str()],
                row_to_transfer_meta,
            )
            .optional()?;
        Ok(row)
    }

    /// Delete every progress row matching `(recipient, file)`, across all
    /// senders.  Returns the number of rows removed.
    pub fn delete_transfer_meta(&self, recipient_id: &UserId, file_name: &str) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM transfer_meta WHERE recipient_id = ?1 AND file_name = ?2",
            params![recipient_id.as_str(), file_name],
        )?;
        Ok(affected)
    }
}

fn row_to_transfer_meta(row: &rusqlite::Row<'_>) -> rusqlite::Result<TransferMeta> {
    let sender_id: String = row.get(0)?;
    let recipient_id: String = row.get(1)?;
    let file_name: String = row.get(2)?;
    let current_chunk: u32 = row.get(3)?;
    let total_chunks: u32 = row.get(4)?;
    let ts_str: String = row.get(5)?;

    let updated_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(TransferMeta {
        sender_id: UserId::new(sender_id),
        recipient_id: UserId::new(recipient_id),
        file_name,
        current_chunk,
        total_chunks,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn meta(sender: &str, recipient: &str, file: &str, chunk: u32, total: u32) -> TransferMeta {
        TransferMeta {
            sender_id: UserId::from(sender),
            recipient_id: UserId::from(recipient),
            file_name: file.to_string(),
            current_chunk: chunk,
            total_chunks: total,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_is_last_write_wins() {
        let (_dir, db) = open_test_db();

        db.upsert_transfer_meta(&meta("alice", "bob", "photo.png", 0, 3))
            .unwrap();
        db.upsert_transfer_meta(&meta("alice", "bob", "photo.png", 2, 3))
            .unwrap();

        let found = db
            .find_transfer_meta(&UserId::from("alice"), &UserId::from("bob"))
            .unwrap()
            .unwrap();
        assert_eq!(found.current_chunk, 2);

        // Still exactly one row for the key.
        let count: u32 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM transfer_meta", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn find_is_scoped_to_the_pair() {
        let (_dir, db) = open_test_db();

        db.upsert_transfer_meta(&meta("alice", "bob", "a.bin", 1, 4))
            .unwrap();

        assert!(db
            .find_transfer_meta(&UserId::from("bob"), &UserId::from("alice"))
            .unwrap()
            .is_none());
        assert!(db
            .find_transfer_meta(&UserId::from("alice"), &UserId::from("bob"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn delete_clears_all_senders_for_the_file() {
        let (_dir, db) = open_test_db();

        db.upsert_transfer_meta(&meta("alice", "bob", "f.txt", 1, 2))
            .unwrap();
        db.upsert_transfer_meta(&meta("carol", "bob", "f.txt", 0, 5))
            .unwrap();
        db.upsert_transfer_meta(&meta("alice", "bob", "other.txt", 0, 1))
            .unwrap();

        assert_eq!(
            db.delete_transfer_meta(&UserId::from("bob"), "f.txt").unwrap(),
            2
        );

        // The unrelated file survives.
        let remaining = db
            .find_transfer_meta(&UserId::from("alice"), &UserId::from("bob"))
            .unwrap()
            .unwrap();
        assert_eq!(remaining.file_name, "other.txt");
    }
}
