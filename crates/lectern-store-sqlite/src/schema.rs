//! SQL schema for the Lectern SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// Timestamps are fixed-width RFC 3339 strings (`…T12:00:00.000000Z`) so that
/// string comparison in SQL matches chronological order.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id       TEXT PRIMARY KEY,
    username      TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,   -- argon2 PHC string
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS languages (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS topic_groups (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS lecturers (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    code        TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    photo       TEXT,
    sort_order  INTEGER NOT NULL UNIQUE,
    level       INTEGER NOT NULL CHECK (level IN (1, 2, 3)),
    guru_id     INTEGER REFERENCES lecturers(id) ON DELETE SET NULL,
    created_at  TEXT NOT NULL,
    CHECK (guru_id IS NULL OR guru_id != id)
);

-- At most one founder.
CREATE UNIQUE INDEX IF NOT EXISTS lecturers_founder_idx ON lecturers(level) WHERE level = 1;

CREATE TABLE IF NOT EXISTS topics (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    lecturer_id INTEGER NOT NULL REFERENCES lecturers(id) ON DELETE CASCADE,
    code        TEXT NOT NULL,
    title       TEXT NOT NULL,
    group_id    INTEGER REFERENCES topic_groups(id) ON DELETE SET NULL,
    sort_order  INTEGER NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE (lecturer_id, sort_order, code)
);

CREATE TABLE IF NOT EXISTS topic_languages (
    topic_id    INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    language_id INTEGER NOT NULL REFERENCES languages(id) ON DELETE CASCADE,
    PRIMARY KEY (topic_id, language_id)
);

CREATE TABLE IF NOT EXISTS lectures (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    topic_id    INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    title       TEXT NOT NULL,
    audio_file  TEXT NOT NULL,
    language_id INTEGER NOT NULL REFERENCES languages(id),
    file_size   INTEGER,
    duration    INTEGER,         -- whole seconds
    sort_order  INTEGER NOT NULL,
    year        INTEGER,
    event       TEXT,
    file_hash   TEXT NOT NULL,   -- sha256 hex of the original filename
    created_at  TEXT NOT NULL,
    UNIQUE (topic_id, sort_order, language_id),
    UNIQUE (topic_id, file_hash)
);

-- One row per (user, lecture); written only via upsert.
CREATE TABLE IF NOT EXISTS lecture_progress (
    user_id      TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    lecture_id   INTEGER NOT NULL REFERENCES lectures(id) ON DELETE CASCADE,
    position     REAL NOT NULL DEFAULT 0,   -- seconds
    completed    INTEGER NOT NULL DEFAULT 0,
    listen_count INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    PRIMARY KEY (user_id, lecture_id)
);

CREATE TABLE IF NOT EXISTS current_lectures (
    user_id    TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    topic_id   INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    lecture_id INTEGER NOT NULL REFERENCES lectures(id) ON DELETE CASCADE,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, topic_id)
);

CREATE TABLE IF NOT EXISTS favorite_lectures (
    user_id    TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    lecture_id INTEGER NOT NULL REFERENCES lectures(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_id, lecture_id)
);

CREATE TABLE IF NOT EXISTS lecture_history (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id               TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    lecture_id            INTEGER NOT NULL REFERENCES lectures(id) ON DELETE CASCADE,
    listened_on           TEXT NOT NULL,   -- YYYY-MM-DD, UTC
    listened_at           TEXT NOT NULL,
    duration_listened     INTEGER NOT NULL DEFAULT 0,
    completion_percentage REAL NOT NULL DEFAULT 0,
    UNIQUE (user_id, lecture_id, listened_on)
);

CREATE TABLE IF NOT EXISTS lecture_markers (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    lecture_id INTEGER NOT NULL REFERENCES lectures(id) ON DELETE CASCADE,
    position   REAL NOT NULL CHECK (position >= 0),
    text       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS topics_lecturer_idx     ON topics(lecturer_id);
CREATE INDEX IF NOT EXISTS lectures_topic_idx      ON lectures(topic_id);
CREATE INDEX IF NOT EXISTS progress_updated_idx    ON lecture_progress(updated_at);
CREATE INDEX IF NOT EXISTS history_user_idx        ON lecture_history(user_id, listened_at);
CREATE INDEX IF NOT EXISTS markers_user_lecture_idx ON lecture_markers(user_id, lecture_id);

PRAGMA user_version = 1;
";
