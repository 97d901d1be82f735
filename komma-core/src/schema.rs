/// DDL to create the schema_version tracking table.
///
/// Applied unconditionally on every DB open (before checking the version),
/// using `IF NOT EXISTS` so it is safe to run multiple times.
pub const SCHEMA_VERSION_DDL: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER NOT NULL
    ) STRICT;
";

/// DDL for the full v1 schema.
///
/// - `documents`: one row per file path, created lazily.
/// - `comments`: edit instructions anchored to a selection.
/// - `changelogs`: audit trail of edit tasks.
/// - `snapshots`: deduplicated whole-document versions. `AUTOINCREMENT`
///   guarantees ids are never reused, so "previous" is always `id <`.
/// - `chat_sessions` / `chat_messages`: per-document conversations.
///
/// All tables use `STRICT` mode. Child rows cascade on document delete.
pub const SCHEMA_V1_SQL: &str = "
    CREATE TABLE IF NOT EXISTS documents (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path       TEXT    NOT NULL UNIQUE,
        last_opened_at  INTEGER NOT NULL,
        created_at      INTEGER NOT NULL
    ) STRICT;

    CREATE TABLE IF NOT EXISTS comments (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        document_id   INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        selected_text TEXT    NOT NULL,
        instruction   TEXT    NOT NULL,
        line_hint     TEXT,
        status        TEXT    NOT NULL DEFAULT 'pending'
                              CHECK(status IN ('pending', 'applied')),
        request_id    TEXT,
        created_at    INTEGER NOT NULL,
        resolved_at   INTEGER
    ) STRICT;

    CREATE TABLE IF NOT EXISTS changelogs (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        document_id       INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        request_id        TEXT    NOT NULL,
        summary           TEXT,
        comments_snapshot TEXT,
        status            TEXT    NOT NULL DEFAULT 'pending'
                                  CHECK(status IN ('pending', 'completed', 'error')),
        stream_log        TEXT,
        created_at        INTEGER NOT NULL,
        completed_at      INTEGER
    ) STRICT;

    CREATE TABLE IF NOT EXISTS snapshots (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        content     TEXT    NOT NULL,
        source      TEXT    NOT NULL DEFAULT 'save'
                            CHECK(source IN ('save', 'agent-edit', 'restore')),
        created_at  INTEGER NOT NULL
    ) STRICT;

    CREATE INDEX IF NOT EXISTS snapshots_by_document ON snapshots(document_id, id);

    CREATE TABLE IF NOT EXISTS chat_sessions (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        created_at  INTEGER NOT NULL,
        updated_at  INTEGER NOT NULL
    ) STRICT;

    CREATE TABLE IF NOT EXISTS chat_messages (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id        INTEGER NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
        role              TEXT    NOT NULL CHECK(role IN ('user', 'assistant')),
        content           TEXT    NOT NULL,
        context_selection TEXT,
        created_at        INTEGER NOT NULL
    ) STRICT;
";

/// Runs forward-only schema migration to migrate the DB to the latest version.
///
/// Idempotent: safe to call on every startup regardless of whether the schema
/// has already been applied.
///
/// # Errors
///
/// Returns `rusqlite::Error` if the DDL fails or the version row cannot be read.
pub fn migrate(db: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    db.execute_batch(SCHEMA_VERSION_DDL)?;

    let version: i64 = db
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if version < 1 {
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute_batch(SCHEMA_V1_SQL)?;
        tx.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
        tx.commit()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_is_idempotent() {
        let mut db = rusqlite::Connection::open_in_memory().unwrap();
        migrate(&mut db).unwrap();
        migrate(&mut db).unwrap();
        let rows: i64 = db
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }
}
