use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::types::{ChatMessage, ChatRole, ChatSession, Comment, CommentStatus, Document};

/// Opens (or creates) the SQLite database at `path`, configures WAL mode,
/// and applies schema migrations via the `schema_version` table.
///
/// This function is the single entry point for all database connections.
/// It sets `busy_timeout` via the `Connection` method (not a PRAGMA string) so
/// the setting takes effect regardless of pragma caching.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the file cannot be opened, WAL configuration
/// fails, or schema DDL fails.
pub async fn open_db(path: &str) -> Result<Connection, tokio_rusqlite::Error> {
    let conn = Connection::open(path).await?;

    conn.call(|db| {
        db.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;
        db.busy_timeout(Duration::from_secs(5))?;
        Ok(())
    })
    .await?;

    // Checkpoint any leftover WAL from a previous run.
    conn.call(|db| {
        db.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    })
    .await?;

    conn.call(|db| {
        crate::schema::migrate(db)?;
        Ok(())
    })
    .await?;

    Ok(conn)
}

/// Returns the current Unix timestamp in seconds.
pub(crate) fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Maps an unexpected enum string stored in `column` to a rusqlite error.
pub(crate) fn bad_enum(column: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(column, value.to_owned(), rusqlite::types::Type::Text)
}

/// Returns the id of the document at `file_path`, inserting it if absent and
/// refreshing `last_opened_at` either way.
pub(crate) fn ensure_document(
    db: &rusqlite::Connection,
    file_path: &str,
    now: i64,
) -> rusqlite::Result<i64> {
    db.execute(
        "INSERT INTO documents (file_path, last_opened_at, created_at)
         VALUES (?1, ?2, ?2)
         ON CONFLICT(file_path) DO UPDATE SET last_opened_at = excluded.last_opened_at",
        rusqlite::params![file_path, now],
    )?;
    db.query_row(
        "SELECT id FROM documents WHERE file_path = ?1",
        rusqlite::params![file_path],
        |r| r.get(0),
    )
}

/// Returns the id of the document at `file_path` without creating it.
pub(crate) fn lookup_document(
    db: &rusqlite::Connection,
    file_path: &str,
) -> rusqlite::Result<Option<i64>> {
    db.query_row(
        "SELECT id FROM documents WHERE file_path = ?1",
        rusqlite::params![file_path],
        |r| r.get(0),
    )
    .optional()
}

/// Finds the document for `file_path`, creating it on first reference.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the upsert transaction fails.
pub async fn get_or_create_document(
    conn: &Connection,
    file_path: &str,
) -> Result<Document, tokio_rusqlite::Error> {
    let file_path = file_path.to_owned();

    conn.call(move |db| {
        let now = now_secs();
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let id = ensure_document(&tx, &file_path, now)?;
        let doc = tx.query_row(
            "SELECT id, file_path, last_opened_at, created_at FROM documents WHERE id = ?1",
            rusqlite::params![id],
            |r| {
                Ok(Document {
                    id: r.get(0)?,
                    file_path: r.get(1)?,
                    last_opened_at: r.get(2)?,
                    created_at: r.get(3)?,
                })
            },
        )?;
        tx.commit()?;
        Ok(doc)
    })
    .await
}

/// Looks up the document for `file_path` without creating it.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the query fails.
pub async fn find_document(
    conn: &Connection,
    file_path: &str,
) -> Result<Option<Document>, tokio_rusqlite::Error> {
    let file_path = file_path.to_owned();

    conn.call(move |db| {
        let doc = db
            .query_row(
                "SELECT id, file_path, last_opened_at, created_at
                 FROM documents WHERE file_path = ?1",
                rusqlite::params![&file_path],
                |r| {
                    Ok(Document {
                        id: r.get(0)?,
                        file_path: r.get(1)?,
                        last_opened_at: r.get(2)?,
                        created_at: r.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(doc)
    })
    .await
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

const COMMENT_COLUMNS: &str = "id, document_id, selected_text, instruction, line_hint, status,
     request_id, created_at, resolved_at";

fn comment_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    let status: String = r.get(5)?;
    Ok(Comment {
        id: r.get(0)?,
        document_id: r.get(1)?,
        selected_text: r.get(2)?,
        instruction: r.get(3)?,
        line_hint: r.get(4)?,
        status: CommentStatus::parse(&status).ok_or_else(|| bad_enum(5, &status))?,
        request_id: r.get(6)?,
        created_at: r.get(7)?,
        resolved_at: r.get(8)?,
    })
}

/// Adds a pending comment to the document at `file_path`.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the insert transaction fails.
pub async fn create_comment(
    conn: &Connection,
    file_path: &str,
    selected_text: &str,
    instruction: &str,
    line_hint: Option<&str>,
) -> Result<Comment, tokio_rusqlite::Error> {
    let file_path = file_path.to_owned();
    let selected_text = selected_text.to_owned();
    let instruction = instruction.to_owned();
    let line_hint = line_hint.map(str::to_owned);

    conn.call(move |db| {
        let now = now_secs();
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let document_id = ensure_document(&tx, &file_path, now)?;
        tx.execute(
            "INSERT INTO comments (document_id, selected_text, instruction, line_hint, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![document_id, &selected_text, &instruction, &line_hint, now],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(Comment {
            id,
            document_id,
            selected_text,
            instruction,
            line_hint,
            status: CommentStatus::Pending,
            request_id: None,
            created_at: now,
            resolved_at: None,
        })
    })
    .await
}

/// Lists every comment on the document in creation order.
///
/// Returns an empty `Vec` for a path komma has never seen.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the query fails.
pub async fn list_comments(
    conn: &Connection,
    file_path: &str,
) -> Result<Vec<Comment>, tokio_rusqlite::Error> {
    query_comments(conn, file_path, None).await
}

/// Lists the pending comments on the document in creation order.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the query fails.
pub async fn list_pending_comments(
    conn: &Connection,
    file_path: &str,
) -> Result<Vec<Comment>, tokio_rusqlite::Error> {
    query_comments(conn, file_path, Some(CommentStatus::Pending)).await
}

async fn query_comments(
    conn: &Connection,
    file_path: &str,
    status: Option<CommentStatus>,
) -> Result<Vec<Comment>, tokio_rusqlite::Error> {
    let file_path = file_path.to_owned();

    conn.call(move |db| {
        let Some(document_id) = lookup_document(db, &file_path)? else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments
             WHERE document_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at ASC, id ASC"
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt
            .query_map(
                rusqlite::params![document_id, status.map(CommentStatus::as_str)],
                comment_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })
    .await
}

/// Deletes a single comment. Returns `true` if a row was removed.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the delete fails.
pub async fn delete_comment(conn: &Connection, comment_id: i64) -> Result<bool, tokio_rusqlite::Error> {
    conn.call(move |db| {
        let changed = db.execute("DELETE FROM comments WHERE id = ?1", rusqlite::params![comment_id])?;
        Ok(changed > 0)
    })
    .await
}

/// Stamps `request_id` on every pending comment of the document.
///
/// Called right before an edit task is dispatched so a later `mark_applied`
/// only touches the comments that were actually sent.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the update transaction fails.
pub async fn tag_pending_comments(
    conn: &Connection,
    file_path: &str,
    request_id: &str,
) -> Result<usize, tokio_rusqlite::Error> {
    let file_path = file_path.to_owned();
    let request_id = request_id.to_owned();

    conn.call(move |db| {
        let Some(document_id) = lookup_document(db, &file_path)? else {
            return Ok(0);
        };
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE comments SET request_id = ?1 WHERE document_id = ?2 AND status = 'pending'",
            rusqlite::params![&request_id, document_id],
        )?;
        tx.commit()?;
        Ok(changed)
    })
    .await
}

/// Moves the comments carried by `request_id` from pending to applied.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the update transaction fails.
pub async fn mark_applied(
    conn: &Connection,
    file_path: &str,
    request_id: &str,
) -> Result<usize, tokio_rusqlite::Error> {
    let file_path = file_path.to_owned();
    let request_id = request_id.to_owned();

    conn.call(move |db| {
        let Some(document_id) = lookup_document(db, &file_path)? else {
            return Ok(0);
        };
        let now = now_secs();
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE comments SET status = 'applied', resolved_at = ?1
             WHERE document_id = ?2 AND request_id = ?3 AND status = 'pending'",
            rusqlite::params![now, document_id, &request_id],
        )?;
        tx.commit()?;
        Ok(changed)
    })
    .await
}

/// Reverts the comments `request_id` applied back to pending (reject).
/// Comments applied by other edits of the document are left alone.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the update transaction fails.
pub async fn revert_applied(
    conn: &Connection,
    file_path: &str,
    request_id: &str,
) -> Result<usize, tokio_rusqlite::Error> {
    let file_path = file_path.to_owned();
    let request_id = request_id.to_owned();

    conn.call(move |db| {
        let Some(document_id) = lookup_document(db, &file_path)? else {
            return Ok(0);
        };
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE comments SET status = 'pending', resolved_at = NULL
             WHERE document_id = ?1 AND request_id = ?2 AND status = 'applied'",
            rusqlite::params![document_id, &request_id],
        )?;
        tx.commit()?;
        Ok(changed)
    })
    .await
}

/// Deletes the comments `request_id` applied (approve).
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the delete transaction fails.
pub async fn delete_applied(
    conn: &Connection,
    file_path: &str,
    request_id: &str,
) -> Result<usize, tokio_rusqlite::Error> {
    let file_path = file_path.to_owned();
    let request_id = request_id.to_owned();

    conn.call(move |db| {
        let Some(document_id) = lookup_document(db, &file_path)? else {
            return Ok(0);
        };
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "DELETE FROM comments
             WHERE document_id = ?1 AND request_id = ?2 AND status = 'applied'",
            rusqlite::params![document_id, &request_id],
        )?;
        tx.commit()?;
        Ok(changed)
    })
    .await
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Starts a new chat session on the document at `file_path`.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the insert transaction fails.
pub async fn create_chat_session(
    conn: &Connection,
    file_path: &str,
) -> Result<ChatSession, tokio_rusqlite::Error> {
    let file_path = file_path.to_owned();

    conn.call(move |db| {
        let now = now_secs();
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let document_id = ensure_document(&tx, &file_path, now)?;
        tx.execute(
            "INSERT INTO chat_sessions (document_id, created_at, updated_at) VALUES (?1, ?2, ?2)",
            rusqlite::params![document_id, now],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(ChatSession { id, document_id, created_at: now, updated_at: now })
    })
    .await
}

/// Lists the chat sessions of a document, most recently active first.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the query fails.
pub async fn list_chat_sessions(
    conn: &Connection,
    file_path: &str,
) -> Result<Vec<ChatSession>, tokio_rusqlite::Error> {
    let file_path = file_path.to_owned();

    conn.call(move |db| {
        let Some(document_id) = lookup_document(db, &file_path)? else {
            return Ok(Vec::new());
        };
        let mut stmt = db.prepare(
            "SELECT id, document_id, created_at, updated_at FROM chat_sessions
             WHERE document_id = ?1
             ORDER BY updated_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![document_id], |r| {
                Ok(ChatSession {
                    id: r.get(0)?,
                    document_id: r.get(1)?,
                    created_at: r.get(2)?,
                    updated_at: r.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })
    .await
}

/// Appends a message to a chat session and touches the session's `updated_at`.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the insert transaction fails (including
/// a foreign-key failure for an unknown session).
pub async fn append_chat_message(
    conn: &Connection,
    session_id: i64,
    role: ChatRole,
    content: &str,
    context_selection: Option<&str>,
) -> Result<ChatMessage, tokio_rusqlite::Error> {
    let content = content.to_owned();
    let context_selection = context_selection.map(str::to_owned);

    conn.call(move |db| {
        let now = now_secs();
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO chat_messages (session_id, role, content, context_selection, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![session_id, role.as_str(), &content, &context_selection, now],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE chat_sessions SET updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, session_id],
        )?;
        tx.commit()?;
        Ok(ChatMessage { id, session_id, role, content, context_selection, created_at: now })
    })
    .await
}

/// Lists the messages of a chat session in creation order.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the query fails.
pub async fn list_chat_messages(
    conn: &Connection,
    session_id: i64,
) -> Result<Vec<ChatMessage>, tokio_rusqlite::Error> {
    conn.call(move |db| {
        let mut stmt = db.prepare(
            "SELECT id, session_id, role, content, context_selection, created_at
             FROM chat_messages WHERE session_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![session_id], |r| {
                let role: String = r.get(2)?;
                Ok(ChatMessage {
                    id: r.get(0)?,
                    session_id: r.get(1)?,
                    role: ChatRole::parse(&role).ok_or_else(|| bad_enum(2, &role))?,
                    content: r.get(3)?,
                    context_selection: r.get(4)?,
                    created_at: r.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })
    .await
}

/// Deletes a chat session and its messages.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the delete transaction fails.
pub async fn delete_chat_session(conn: &Connection, session_id: i64) -> Result<(), tokio_rusqlite::Error> {
    conn.call(move |db| {
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM chat_messages WHERE session_id = ?1", rusqlite::params![session_id])?;
        tx.execute("DELETE FROM chat_sessions WHERE id = ?1", rusqlite::params![session_id])?;
        tx.commit()?;
        Ok(())
    })
    .await
}
