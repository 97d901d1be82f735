//! Snapshot store and changelog recorder against a real database.

use komma_core::changelog::ChangelogRecorder;
use komma_core::db;
use komma_core::error::RecorderError;
use komma_core::snapshots::{SnapshotStore, DEFAULT_LIST_LIMIT};
use komma_core::types::{AppendOutcome, ChangelogStatus, SnapshotSource};

fn temp_db_path() -> String {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.keep().join("test.db");
    path.to_string_lossy().to_string()
}

async fn count_rows(conn: &tokio_rusqlite::Connection, table: &'static str) -> i64 {
    conn.call(move |db| {
        Ok::<_, rusqlite::Error>(db.query_row(
            &format!("SELECT COUNT(*) FROM {table}"),
            [],
            |r| r.get(0),
        )?)
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn identical_append_is_skipped() {
    let conn = db::open_db(&temp_db_path()).await.unwrap();
    let store = SnapshotStore::new(conn.clone());

    let first = store.append("/a.md", "Hello", SnapshotSource::Save).await.unwrap();
    assert!(matches!(first, AppendOutcome::Inserted { .. }));
    let second = store.append("/a.md", "Hello", SnapshotSource::Save).await.unwrap();
    assert_eq!(second, AppendOutcome::Skipped);
    assert_eq!(count_rows(&conn, "snapshots").await, 1);

    // Dedup only compares with the latest snapshot of the same document.
    let other = store.append("/b.md", "Hello", SnapshotSource::Save).await.unwrap();
    assert!(!other.is_skipped());
}

#[tokio::test]
async fn appended_ids_increase() {
    let conn = db::open_db(&temp_db_path()).await.unwrap();
    let store = SnapshotStore::new(conn);

    let mut last = 0;
    for content in ["one", "two", "one", "three"] {
        match store.append("/a.md", content, SnapshotSource::AgentEdit).await.unwrap() {
            AppendOutcome::Inserted { id } => {
                assert!(id > last);
                last = id;
            }
            AppendOutcome::Skipped => panic!("distinct from latest, must insert"),
        }
    }

    let listed = store.list("/a.md", DEFAULT_LIST_LIMIT).await.unwrap();
    assert_eq!(listed.len(), 4);
    assert!(listed.windows(2).all(|w| w[0].id > w[1].id), "newest first");
    assert_eq!(store.list("/a.md", 2).await.unwrap().len(), 2);
    assert!(store.list("/unknown.md", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn previous_is_scoped_to_document() {
    let conn = db::open_db(&temp_db_path()).await.unwrap();
    let store = SnapshotStore::new(conn);

    let id = |o: AppendOutcome| match o {
        AppendOutcome::Inserted { id } => id,
        AppendOutcome::Skipped => panic!("unexpected skip"),
    };
    let a1 = id(store.append("/a.md", "a1", SnapshotSource::Save).await.unwrap());
    let b1 = id(store.append("/b.md", "b1", SnapshotSource::Save).await.unwrap());
    let a2 = id(store.append("/a.md", "a2", SnapshotSource::AgentEdit).await.unwrap());

    assert!(store.get_previous(a1).await.unwrap().is_none());
    assert!(store.get_previous(b1).await.unwrap().is_none());

    let prev = store.get_previous(a2).await.unwrap().unwrap();
    assert_eq!(prev.id, a1);
    assert_eq!(prev.content, "a1");

    let full = store.get(a2).await.unwrap().unwrap();
    assert_eq!(full.content, "a2");
    assert_eq!(full.source, SnapshotSource::AgentEdit);
    assert!(store.get(9_999).await.unwrap().is_none());
    assert!(store.get_previous(9_999).await.unwrap().is_none());
}

#[tokio::test]
async fn clear_removes_only_that_document() {
    let conn = db::open_db(&temp_db_path()).await.unwrap();
    let store = SnapshotStore::new(conn);
    store.append("/a.md", "x", SnapshotSource::Save).await.unwrap();
    store.append("/a.md", "y", SnapshotSource::Save).await.unwrap();
    store.append("/b.md", "x", SnapshotSource::Save).await.unwrap();

    assert_eq!(store.clear("/a.md").await.unwrap(), 2);
    assert!(store.list("/a.md", 10).await.unwrap().is_empty());
    assert_eq!(store.list("/b.md", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn completed_at_is_set_once() {
    let conn = db::open_db(&temp_db_path()).await.unwrap();
    let recorder = ChangelogRecorder::new(conn.clone());

    let id = recorder.create("/a.md", "req-1", Some("[]")).await.unwrap();
    let first = recorder
        .patch(id, "completed", Some("transcript"), Some("done"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.status, ChangelogStatus::Completed);
    let stamped = first.completed_at.expect("completed_at set");

    // Move the stamp into the past so a second write would be visible.
    conn.call(move |db| {
        Ok::<_, rusqlite::Error>(db.execute(
            "UPDATE changelogs SET completed_at = completed_at - 100 WHERE id = ?1",
            rusqlite::params![id],
        )?)
    })
    .await
    .unwrap();

    let second = recorder.patch(id, "error", None, None).await.unwrap().unwrap();
    assert_eq!(second.completed_at, Some(stamped - 100));
    assert_eq!(second.stream_log.as_deref(), Some("transcript"));
    assert_eq!(second.summary.as_deref(), Some("done"));
}

#[tokio::test]
async fn unknown_status_mutates_nothing() {
    let conn = db::open_db(&temp_db_path()).await.unwrap();
    let recorder = ChangelogRecorder::new(conn);

    let id = recorder.create("/a.md", "req-1", None).await.unwrap();
    for status in ["done", "pending", ""] {
        let err = recorder.patch(id, status, Some("log"), Some("s")).await.unwrap_err();
        assert!(matches!(err, RecorderError::UnknownStatus(_)));
    }

    let entries = recorder.list("/a.md").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, ChangelogStatus::Pending);
    assert!(entries[0].completed_at.is_none());
    assert!(entries[0].stream_log.is_none());
}

#[tokio::test]
async fn changelog_lists_newest_first_and_clears() {
    let conn = db::open_db(&temp_db_path()).await.unwrap();
    let recorder = ChangelogRecorder::new(conn);

    let a = recorder.create("/a.md", "req-1", None).await.unwrap();
    let b = recorder.create("/a.md", "req-2", None).await.unwrap();
    recorder.create("/b.md", "req-3", None).await.unwrap();

    let ids: Vec<i64> = recorder.list("/a.md").await.unwrap().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![b, a]);

    assert!(recorder.patch(9_999, "completed", None, None).await.unwrap().is_none());

    assert_eq!(recorder.clear("/a.md").await.unwrap(), 2);
    assert!(recorder.list("/a.md").await.unwrap().is_empty());
    assert_eq!(recorder.list("/b.md").await.unwrap().len(), 1);
}

#[tokio::test]
async fn best_effort_finish_without_entry_is_noop() {
    let conn = db::open_db(&temp_db_path()).await.unwrap();
    let recorder = ChangelogRecorder::new(conn);
    recorder.finish(None, ChangelogStatus::Completed, None, None).await;

    let id = recorder.start("/a.md", "req-1", None).await;
    recorder.finish(id, ChangelogStatus::Error, None, Some("boom")).await;
    let entries = recorder.list("/a.md").await.unwrap();
    assert_eq!(entries[0].status, ChangelogStatus::Error);
    assert_eq!(entries[0].summary.as_deref(), Some("boom"));
}
