//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: chats and their messages
    r#"
    CREATE TABLE IF NOT EXISTS chats (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        user_email  TEXT NOT NULL,
        name        TEXT NOT NULL,
        timestamp   TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS messages (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        chat_id     INTEGER NOT NULL REFERENCES chats(id),
        role        TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
        content     TEXT NOT NULL
    );
    "#,
];

/// Secondary indexes every list/read path depends on.
const INDEXES: &[(&str, &str)] = &[
    (
        "idx_chats_user_email",
        "CREATE INDEX IF NOT EXISTS idx_chats_user_email ON chats(user_email)",
    ),
    (
        "idx_chats_timestamp",
        "CREATE INDEX IF NOT EXISTS idx_chats_timestamp ON chats(timestamp)",
    ),
    (
        "idx_messages_chat_id",
        "CREATE INDEX IF NOT EXISTS idx_messages_chat_id ON messages(chat_id)",
    ),
];

/// Run all pending migrations, then make sure every index exists
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    ensure_indexes(conn)
}

/// Create any secondary index that is missing.
///
/// Runs on every open, so a store whose indexes were dropped gets them back
/// without a version bump.
pub fn ensure_indexes(conn: &Connection) -> crate::error::Result<()> {
    for (name, sql) in INDEXES {
        if !index_exists(conn, name)? {
            tracing::info!(index = name, "Creating missing index");
        }
        conn.execute(sql, [])?;
    }
    Ok(())
}

fn index_exists(conn: &Connection, name: &str) -> crate::error::Result<bool> {
    let count: i32 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?",
        [name],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
