//! v001 -- Initial schema creation.
//!
//! Creates the three core tables: `users`, `conversations`, and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    username      TEXT NOT NULL UNIQUE,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,              -- argon2 PHC string, never serialized outward
    presence      TEXT NOT NULL DEFAULT 'offline',
    last_seen     TEXT NOT NULL,              -- ISO-8601 / RFC-3339
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Conversations (dyadic; id is the sorted pair of participant ids)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id              TEXT PRIMARY KEY NOT NULL,  -- "<lo>-<hi>" pair id
    participant_a   TEXT NOT NULL,              -- FK -> users(id), sorted low
    participant_b   TEXT NOT NULL,              -- FK -> users(id), sorted high
    last_message_id TEXT,                       -- denormalized pointer, nullable
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,

    FOREIGN KEY (participant_a) REFERENCES users(id),
    FOREIGN KEY (participant_b) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_conversations_updated
    ON conversations(updated_at DESC);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    conversation_id TEXT NOT NULL,              -- FK -> conversations(id)
    sender_id       TEXT NOT NULL,              -- FK -> users(id)
    content         TEXT NOT NULL,
    is_read         INTEGER NOT NULL DEFAULT 0, -- boolean 0/1, monotonic 0 -> 1
    created_at      TEXT NOT NULL,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id),
    FOREIGN KEY (sender_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages(conversation_id, created_at ASC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
