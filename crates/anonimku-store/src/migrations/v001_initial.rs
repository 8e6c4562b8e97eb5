//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `users`, `matches`, `messages` and
//! `reveal_requests`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id                  TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    name                TEXT NOT NULL,
    phone               TEXT NOT NULL UNIQUE,
    is_online           INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    is_in_chat          INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    profile_revealed_to TEXT,                        -- nullable FK -> users(id)
    created_at          TEXT NOT NULL,               -- RFC-3339, microseconds, UTC
    updated_at          TEXT NOT NULL,

    FOREIGN KEY (profile_revealed_to) REFERENCES users(id)
);

-- ----------------------------------------------------------------
-- Matches
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS matches (
    id                     TEXT PRIMARY KEY NOT NULL,
    user1_id               TEXT NOT NULL,
    user2_id               TEXT NOT NULL,
    status                 TEXT NOT NULL DEFAULT 'active'
                           CHECK (status IN ('active', 'ended')),
    both_profiles_revealed INTEGER NOT NULL DEFAULT 0,
    created_at             TEXT NOT NULL,
    ended_at               TEXT,

    CHECK (user1_id <> user2_id),
    FOREIGN KEY (user1_id) REFERENCES users(id),
    FOREIGN KEY (user2_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_matches_user1 ON matches(user1_id, status);
CREATE INDEX IF NOT EXISTS idx_matches_user2 ON matches(user2_id, status);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,  -- commit order
    id         TEXT NOT NULL UNIQUE,
    match_id   TEXT NOT NULL,
    sender_id  TEXT NOT NULL,
    content    TEXT NOT NULL,
    is_read    INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,

    FOREIGN KEY (match_id) REFERENCES matches(id),
    FOREIGN KEY (sender_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_match_ts
    ON messages(match_id, created_at, seq);

-- ----------------------------------------------------------------
-- Reveal requests
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS reveal_requests (
    id           TEXT PRIMARY KEY NOT NULL,
    match_id     TEXT NOT NULL,
    requester_id TEXT NOT NULL,
    target_id    TEXT NOT NULL,
    status       TEXT NOT NULL DEFAULT 'pending'
                 CHECK (status IN ('pending', 'accepted', 'rejected')),
    created_at   TEXT NOT NULL,
    responded_at TEXT,

    FOREIGN KEY (match_id) REFERENCES matches(id),
    FOREIGN KEY (requester_id) REFERENCES users(id),
    FOREIGN KEY (target_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_reveal_requests_target
    ON reveal_requests(target_id, status);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
