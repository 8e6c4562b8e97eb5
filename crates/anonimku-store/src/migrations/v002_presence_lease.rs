//! v002 -- Presence lease and invariant indexes.
//!
//! Presence used to be a bare boolean, so a client that crashed stayed
//! "online" forever.  `last_seen_at` turns it into a lease.  The partial
//! unique indexes back the one-active-match and one-pending-request rules at
//! the storage level.

use rusqlite::Connection;

const UP_SQL: &str = r#"
ALTER TABLE users ADD COLUMN last_seen_at TEXT NOT NULL DEFAULT '1970-01-01T00:00:00.000000Z';
UPDATE users SET last_seen_at = updated_at;

CREATE INDEX IF NOT EXISTS idx_users_pool
    ON users(is_online, is_in_chat, last_seen_at);

CREATE UNIQUE INDEX IF NOT EXISTS idx_matches_one_active_user1
    ON matches(user1_id) WHERE status = 'active';
CREATE UNIQUE INDEX IF NOT EXISTS idx_matches_one_active_user2
    ON matches(user2_id) WHERE status = 'active';

CREATE UNIQUE INDEX IF NOT EXISTS idx_reveal_requests_one_pending
    ON reveal_requests(match_id) WHERE status = 'pending';
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
