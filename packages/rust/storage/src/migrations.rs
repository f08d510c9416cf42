//! SQL migration definitions for the AskDocs database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: documents, threads, messages",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Ingested documentation pages, one per source URL
CREATE TABLE IF NOT EXISTS documents (
    id         TEXT PRIMARY KEY,
    url        TEXT NOT NULL UNIQUE,
    text       TEXT NOT NULL,
    file_id    TEXT,
    updated_at TEXT NOT NULL
);

-- Session to remote conversation mapping
CREATE TABLE IF NOT EXISTS threads (
    session_id TEXT PRIMARY KEY,
    thread_id  TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Visible transcript, append-only
CREATE TABLE IF NOT EXISTS messages (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    is_viewer  INTEGER NOT NULL,
    text       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_session_id ON messages(session_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
