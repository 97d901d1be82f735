//! Integration test for the database lifecycle.
//!
//! Exercises: open_db, migrate, documents, the comment review-outcome
//! transitions, and chat persistence.

use komma_core::db;
use komma_core::types::{ChatRole, CommentStatus};

fn temp_db_path() -> String {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.keep().join("test.db");
    path.to_string_lossy().to_string()
}

#[tokio::test]
async fn open_db_configures_wal_and_schema() {
    let path = temp_db_path();
    let conn = db::open_db(&path).await.unwrap();

    let version: i64 = conn
        .call(|db| {
            Ok::<_, rusqlite::Error>(db.query_row(
                "SELECT MAX(version) FROM schema_version",
                [],
                |r| r.get(0),
            )?)
        })
        .await
        .unwrap();
    assert_eq!(version, 1, "schema_version should be 1");

    let journal: String = conn
        .call(|db| {
            Ok::<_, rusqlite::Error>(
                db.query_row("PRAGMA journal_mode", [], |r| r.get(0))?,
            )
        })
        .await
        .unwrap();
    assert_eq!(journal, "wal", "journal_mode should be wal");

    // Reopening must not re-run migrations.
    drop(conn);
    let conn = db::open_db(&path).await.unwrap();
    let rows: i64 = conn
        .call(|db| {
            Ok::<_, rusqlite::Error>(
                db.query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))?,
            )
        })
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn documents_are_created_lazily() {
    let conn = db::open_db(&temp_db_path()).await.unwrap();

    assert!(db::find_document(&conn, "/notes/a.md").await.unwrap().is_none());
    assert!(db::list_comments(&conn, "/notes/a.md").await.unwrap().is_empty());

    let doc = db::get_or_create_document(&conn, "/notes/a.md").await.unwrap();
    let again = db::get_or_create_document(&conn, "/notes/a.md").await.unwrap();
    assert_eq!(doc.id, again.id);
    assert!(again.last_opened_at >= doc.last_opened_at);

    let found = db::find_document(&conn, "/notes/a.md").await.unwrap().unwrap();
    assert_eq!(found.id, doc.id);
}

#[tokio::test]
async fn comment_review_transitions() {
    let conn = db::open_db(&temp_db_path()).await.unwrap();
    let doc = "/notes/a.md";

    let first = db::create_comment(&conn, doc, "Old", "make it new", Some("2")).await.unwrap();
    let second = db::create_comment(&conn, doc, "T", "shout", None).await.unwrap();
    assert_eq!(first.status, CommentStatus::Pending);

    assert_eq!(db::tag_pending_comments(&conn, doc, "req-1").await.unwrap(), 2);
    // A comment written while the task runs is not carried by it.
    let late = db::create_comment(&conn, doc, "x", "later", None).await.unwrap();

    assert_eq!(db::mark_applied(&conn, doc, "req-1").await.unwrap(), 2);
    let pending = db::list_pending_comments(&conn, doc).await.unwrap();
    assert_eq!(pending.iter().map(|c| c.id).collect::<Vec<_>>(), vec![late.id]);

    // Reject path: applied goes back to pending, scoped to the request.
    assert_eq!(db::revert_applied(&conn, doc, "req-other").await.unwrap(), 0);
    assert_eq!(db::revert_applied(&conn, doc, "req-1").await.unwrap(), 2);
    let all = db::list_comments(&conn, doc).await.unwrap();
    assert!(all.iter().all(|c| c.status == CommentStatus::Pending && c.resolved_at.is_none()));
    assert_eq!(
        all.iter().map(|c| c.id).collect::<Vec<_>>(),
        vec![first.id, second.id, late.id]
    );

    // Approve path: applied comments are deleted.
    db::tag_pending_comments(&conn, doc, "req-2").await.unwrap();
    db::mark_applied(&conn, doc, "req-2").await.unwrap();
    assert_eq!(db::delete_applied(&conn, doc, "req-1").await.unwrap(), 0);
    assert_eq!(db::delete_applied(&conn, doc, "req-2").await.unwrap(), 3);
    assert!(db::list_comments(&conn, doc).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_single_comment() {
    let conn = db::open_db(&temp_db_path()).await.unwrap();
    let c = db::create_comment(&conn, "/a.md", "sel", "fix", None).await.unwrap();
    assert!(db::delete_comment(&conn, c.id).await.unwrap());
    assert!(!db::delete_comment(&conn, c.id).await.unwrap());
}

#[tokio::test]
async fn chat_sessions_and_messages() {
    let conn = db::open_db(&temp_db_path()).await.unwrap();
    let doc = "/notes/a.md";

    let older = db::create_chat_session(&conn, doc).await.unwrap();
    let newer = db::create_chat_session(&conn, doc).await.unwrap();

    db::append_chat_message(&conn, older.id, ChatRole::User, "hi", Some("sel")).await.unwrap();
    db::append_chat_message(&conn, older.id, ChatRole::Assistant, "hello", None).await.unwrap();

    let messages = db::list_chat_messages(&conn, older.id).await.unwrap();
    assert_eq!(
        messages.iter().map(|m| (m.role, m.content.as_str())).collect::<Vec<_>>(),
        vec![(ChatRole::User, "hi"), (ChatRole::Assistant, "hello")]
    );
    assert_eq!(messages[0].context_selection.as_deref(), Some("sel"));

    let sessions = db::list_chat_sessions(&conn, doc).await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions.iter().any(|s| s.id == newer.id));

    db::delete_chat_session(&conn, older.id).await.unwrap();
    assert!(db::list_chat_messages(&conn, older.id).await.unwrap().is_empty());
    assert_eq!(db::list_chat_sessions(&conn, doc).await.unwrap().len(), 1);
}
