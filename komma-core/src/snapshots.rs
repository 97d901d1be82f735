//! Deduplicated, ordered whole-document versions.
//!
//! Snapshot ids come from a single `AUTOINCREMENT` sequence shared by every
//! document, so ids are strictly increasing per store. Every "previous"
//! lookup is still scoped to the owning document, and ordering is always by
//! id: second-resolution timestamps collide routinely.

use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::db::{bad_enum, ensure_document, lookup_document, now_secs};
use crate::types::{AppendOutcome, Snapshot, SnapshotMeta, SnapshotSource};

/// Default page size for [`SnapshotStore::list`].
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Handle to the snapshot table. Cheap to clone: it shares the underlying
/// connection thread.
#[derive(Clone)]
pub struct SnapshotStore {
    conn: Connection,
}

fn snapshot_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Snapshot> {
    let source: String = r.get(3)?;
    Ok(Snapshot {
        id: r.get(0)?,
        document_id: r.get(1)?,
        content: r.get(2)?,
        source: SnapshotSource::parse(&source).ok_or_else(|| bad_enum(3, &source))?,
        created_at: r.get(4)?,
    })
}

impl SnapshotStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Appends `content` as the newest snapshot of the document at `file_path`.
    ///
    /// Returns [`AppendOutcome::Skipped`] without writing when `content` is
    /// byte-identical to the document's latest snapshot. The comparison and the
    /// insert run inside one `BEGIN IMMEDIATE` transaction so two concurrent
    /// appends of the same content cannot both insert.
    ///
    /// # Errors
    ///
    /// Returns `tokio_rusqlite::Error` if the transaction fails.
    pub async fn append(
        &self,
        file_path: &str,
        content: &str,
        source: SnapshotSource,
    ) -> Result<AppendOutcome, tokio_rusqlite::Error> {
        let file_path = file_path.to_owned();
        let content = content.to_owned();

        self.conn
            .call(move |db| {
                let now = now_secs();
                let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
                let document_id = ensure_document(&tx, &file_path, now)?;

                let latest: Option<String> = tx
                    .query_row(
                        "SELECT content FROM snapshots WHERE document_id = ?1
                         ORDER BY id DESC LIMIT 1",
                        rusqlite::params![document_id],
                        |r| r.get(0),
                    )
                    .optional()?;

                if latest.as_deref() == Some(content.as_str()) {
                    tx.commit()?;
                    return Ok(AppendOutcome::Skipped);
                }

                tx.execute(
                    "INSERT INTO snapshots (document_id, content, source, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![document_id, &content, source.as_str(), now],
                )?;
                let id = tx.last_insert_rowid();
                tx.commit()?;
                Ok(AppendOutcome::Inserted { id })
            })
            .await
    }

    /// Lists up to `limit` snapshots of the document, newest first.
    ///
    /// Metadata only: documents may be large, so content is fetched lazily
    /// through [`SnapshotStore::get`].
    ///
    /// # Errors
    ///
    /// Returns `tokio_rusqlite::Error` if the query fails.
    pub async fn list(
        &self,
        file_path: &str,
        limit: usize,
    ) -> Result<Vec<SnapshotMeta>, tokio_rusqlite::Error> {
        let file_path = file_path.to_owned();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.conn
            .call(move |db| {
                let Some(document_id) = lookup_document(db, &file_path)? else {
                    return Ok(Vec::new());
                };
                let mut stmt = db.prepare(
                    "SELECT id, source, created_at FROM snapshots
                     WHERE document_id = ?1
                     ORDER BY id DESC
                     LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![document_id, limit], |r| {
                        let source: String = r.get(1)?;
                        Ok(SnapshotMeta {
                            id: r.get(0)?,
                            source: SnapshotSource::parse(&source)
                                .ok_or_else(|| bad_enum(1, &source))?,
                            created_at: r.get(2)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    /// Fetches one snapshot with its content.
    ///
    /// # Errors
    ///
    /// Returns `tokio_rusqlite::Error` if the query fails.
    pub async fn get(&self, id: i64) -> Result<Option<Snapshot>, tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                let snapshot = db
                    .query_row(
                        "SELECT id, document_id, content, source, created_at
                         FROM snapshots WHERE id = ?1",
                        rusqlite::params![id],
                        snapshot_from_row,
                    )
                    .optional()?;
                Ok(snapshot)
            })
            .await
    }

    /// Returns the snapshot with the largest id strictly below `id` belonging to
    /// the same document, or `None` for the document's first snapshot (and for an
    /// unknown `id`).
    ///
    /// # Errors
    ///
    /// Returns `tokio_rusqlite::Error` if the query fails.
    pub async fn get_previous(&self, id: i64) -> Result<Option<Snapshot>, tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                let previous = db
                    .query_row(
                        "SELECT prev.id, prev.document_id, prev.content, prev.source, prev.created_at
                         FROM snapshots AS cur
                         JOIN snapshots AS prev
                           ON prev.document_id = cur.document_id AND prev.id < cur.id
                         WHERE cur.id = ?1
                         ORDER BY prev.id DESC
                         LIMIT 1",
                        rusqlite::params![id],
                        snapshot_from_row,
                    )
                    .optional()?;
                Ok(previous)
            })
            .await
    }

    /// Removes every snapshot of the document. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns `tokio_rusqlite::Error` if the delete transaction fails.
    pub async fn clear(&self, file_path: &str) -> Result<usize, tokio_rusqlite::Error> {
        let file_path = file_path.to_owned();

        self.conn
            .call(move |db| {
                let Some(document_id) = lookup_document(db, &file_path)? else {
                    return Ok(0);
                };
                let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
                let deleted = tx.execute(
                    "DELETE FROM snapshots WHERE document_id = ?1",
                    rusqlite::params![document_id],
                )?;
                tx.commit()?;
                Ok(deleted)
            })
            .await
    }
}
