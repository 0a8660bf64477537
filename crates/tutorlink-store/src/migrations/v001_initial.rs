//! v001 -- Initial schema creation.
//!
//! Creates the six marketplace tables: `users`, `slots`, `chats`,
//! `messages`, `blocked_users` and `reports`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id          TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    role        TEXT NOT NULL CHECK (role IN ('student', 'tutor')),
    name        TEXT,
    username    TEXT UNIQUE,
    birth_date  TEXT,                         -- YYYY-MM-DD
    city        TEXT,
    bio         TEXT,
    avatar_name TEXT,                         -- blob store reference
    avatar_mime TEXT,
    avatar_size INTEGER,
    created_at  TEXT NOT NULL,                -- RFC-3339
    updated_at  TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Slots
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS slots (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    tutor_id   TEXT NOT NULL,                 -- FK -> users(id)
    date       TEXT NOT NULL,                 -- YYYY-MM-DD
    start_time TEXT NOT NULL,                 -- HH:MM
    end_time   TEXT NOT NULL,                 -- HH:MM
    state      TEXT NOT NULL DEFAULT 'free' CHECK (state IN ('free', 'booked', 'paid')),
    student_id TEXT,                          -- FK -> users(id), set iff state <> 'free'
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    CHECK (start_time < end_time),
    CHECK ((state = 'free') = (student_id IS NULL)),
    FOREIGN KEY (tutor_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (student_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_slots_tutor_date ON slots(tutor_id, date);
CREATE INDEX IF NOT EXISTS idx_slots_student ON slots(student_id);

-- ----------------------------------------------------------------
-- Chats (one summary row per unordered user pair)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    id                 TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    user1_id           TEXT NOT NULL,               -- lower id of the pair
    user2_id           TEXT NOT NULL,               -- higher id of the pair
    last_message       TEXT,
    last_message_type  TEXT NOT NULL CHECK (last_message_type IN ('text', 'image', 'audio')),
    last_sender_id     TEXT NOT NULL,
    last_timestamp     TEXT NOT NULL,
    unread_count_user1 INTEGER NOT NULL DEFAULT 0 CHECK (unread_count_user1 >= 0),
    unread_count_user2 INTEGER NOT NULL DEFAULT 0 CHECK (unread_count_user2 >= 0),

    CHECK (user1_id < user2_id),
    FOREIGN KEY (user1_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (user2_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_chats_pair ON chats(user1_id, user2_id);
CREATE INDEX IF NOT EXISTS idx_chats_user2 ON chats(user2_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    chat_id     TEXT NOT NULL,                -- FK -> chats(id)
    sender_id   TEXT NOT NULL,                -- FK -> users(id)
    receiver_id TEXT NOT NULL,                -- FK -> users(id)
    body        TEXT,
    type        TEXT NOT NULL CHECK (type IN ('text', 'image', 'audio')),
    is_read     INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    created_at  TEXT NOT NULL,

    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
    FOREIGN KEY (sender_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (receiver_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_ts ON messages(chat_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_messages_unread ON messages(chat_id, receiver_id, is_read);

-- ----------------------------------------------------------------
-- Blocked users (directional)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS blocked_users (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    user_id         TEXT NOT NULL,              -- blocker
    blocked_user_id TEXT NOT NULL,              -- blocked
    created_at      TEXT NOT NULL,

    CHECK (user_id <> blocked_user_id),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (blocked_user_id) REFERENCES users(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Reports (append-only)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS reports (
    id               TEXT PRIMARY KEY NOT NULL, -- UUID v4
    reported_by      TEXT NOT NULL,             -- FK -> users(id)
    message_id       TEXT NOT NULL,             -- FK -> messages(id)
    message_owner_id TEXT NOT NULL,             -- FK -> users(id)
    created_at       TEXT NOT NULL,

    FOREIGN KEY (reported_by) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE,
    FOREIGN KEY (message_owner_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_reports_message ON reports(message_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
