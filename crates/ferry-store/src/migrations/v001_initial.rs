//! v001 -- Initial schema creation.
//!
//! Creates the two record tables: `link_requests` and `transfer_meta`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Link negotiation records, one per recipient
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS link_requests (
    recipient_id TEXT PRIMARY KEY NOT NULL,
    entries      TEXT NOT NULL                -- JSON array of {senderId, link, accepted}
);

-- ----------------------------------------------------------------
-- Transfer progress markers, one per (sender, recipient, file)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS transfer_meta (
    sender_id     TEXT NOT NULL,
    recipient_id  TEXT NOT NULL,
    file_name     TEXT NOT NULL,
    current_chunk INTEGER NOT NULL,
    total_chunks  INTEGER NOT NULL,
    updated_at    TEXT NOT NULL,              -- ISO-8601 / RFC-3339

    PRIMARY KEY (sender_id, recipient_id, file_name)
);

-- Resume lookups use the primary key's (sender, recipient) prefix;
-- completion deletes are by (recipient, file) regardless of sender.
CREATE INDEX IF NOT EXISTS idx_transfer_meta_completion
    ON transfer_meta(recipient_id, file_name);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
