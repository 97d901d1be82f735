//! Append/patch audit trail of edit-task outcomes.
//!
//! The fallible operations back the history panel. The orchestration layer
//! goes through [`ChangelogRecorder::start`] and [`ChangelogRecorder::finish`],
//! which log and swallow every failure: the audit trail must never block or
//! fail the task it describes.

use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;
use tracing::warn;

use crate::db::{bad_enum, ensure_document, lookup_document, now_secs};
use crate::error::RecorderError;
use crate::types::{ChangelogEntry, ChangelogStatus};

const ENTRY_COLUMNS: &str = "id, document_id, request_id, summary, comments_snapshot, status,
     stream_log, created_at, completed_at";

fn entry_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ChangelogEntry> {
    let status: String = r.get(5)?;
    Ok(ChangelogEntry {
        id: r.get(0)?,
        document_id: r.get(1)?,
        request_id: r.get(2)?,
        summary: r.get(3)?,
        comments_snapshot: r.get(4)?,
        status: ChangelogStatus::parse(&status).ok_or_else(|| bad_enum(5, &status))?,
        stream_log: r.get(6)?,
        created_at: r.get(7)?,
        completed_at: r.get(8)?,
    })
}

#[derive(Clone)]
pub struct ChangelogRecorder {
    conn: Connection,
}

impl ChangelogRecorder {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Inserts a `pending` entry for `request_id` and returns its id.
    ///
    /// # Errors
    ///
    /// Returns `tokio_rusqlite::Error` if the insert transaction fails.
    pub async fn create(
        &self,
        file_path: &str,
        request_id: &str,
        comments_snapshot: Option<&str>,
    ) -> Result<i64, tokio_rusqlite::Error> {
        let file_path = file_path.to_owned();
        let request_id = request_id.to_owned();
        let comments_snapshot = comments_snapshot.map(str::to_owned);

        self.conn
            .call(move |db| {
                let now = now_secs();
                let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
                let document_id = ensure_document(&tx, &file_path, now)?;
                tx.execute(
                    "INSERT INTO changelogs (document_id, request_id, comments_snapshot, status, created_at)
                     VALUES (?1, ?2, ?3, 'pending', ?4)",
                    rusqlite::params![document_id, &request_id, &comments_snapshot, now],
                )?;
                let id = tx.last_insert_rowid();
                tx.commit()?;
                Ok(id)
            })
            .await
    }

    /// Records the outcome of an entry.
    ///
    /// `status` must be `"completed"` or `"error"`; anything else is rejected
    /// with [`RecorderError::UnknownStatus`] before the database is touched.
    /// `stream_log` and `summary` overwrite only when given. `completed_at` is
    /// set by the first terminal patch and never moved afterwards.
    ///
    /// Returns the updated entry, or `None` if `entry_id` does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError`] on an unknown status or database failure.
    pub async fn patch(
        &self,
        entry_id: i64,
        status: &str,
        stream_log: Option<&str>,
        summary: Option<&str>,
    ) -> Result<Option<ChangelogEntry>, RecorderError> {
        let status = match ChangelogStatus::parse(status) {
            Some(s @ (ChangelogStatus::Completed | ChangelogStatus::Error)) => s,
            _ => return Err(RecorderError::UnknownStatus(status.to_owned())),
        };
        let stream_log = stream_log.map(str::to_owned);
        let summary = summary.map(str::to_owned);

        Ok(self.update_entry(entry_id, status, stream_log, summary).await?)
    }

    async fn update_entry(
        &self,
        entry_id: i64,
        status: ChangelogStatus,
        stream_log: Option<String>,
        summary: Option<String>,
    ) -> Result<Option<ChangelogEntry>, tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                let now = now_secs();
                let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
                tx.execute(
                    "UPDATE changelogs
                     SET status = ?1,
                         stream_log = COALESCE(?2, stream_log),
                         summary = COALESCE(?3, summary),
                         completed_at = COALESCE(completed_at, ?4)
                     WHERE id = ?5",
                    rusqlite::params![status.as_str(), &stream_log, &summary, now, entry_id],
                )?;
                let entry = tx
                    .query_row(
                        &format!("SELECT {ENTRY_COLUMNS} FROM changelogs WHERE id = ?1"),
                        rusqlite::params![entry_id],
                        entry_from_row,
                    )
                    .optional()?;
                tx.commit()?;
                Ok(entry)
            })
            .await
    }

    /// Lists the document's entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns `tokio_rusqlite::Error` if the query fails.
    pub async fn list(&self, file_path: &str) -> Result<Vec<ChangelogEntry>, tokio_rusqlite::Error> {
        let file_path = file_path.to_owned();

        self.conn
            .call(move |db| {
                let Some(document_id) = lookup_document(db, &file_path)? else {
                    return Ok(Vec::new());
                };
                let mut stmt = db.prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM changelogs
                     WHERE document_id = ?1
                     ORDER BY id DESC"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![document_id], entry_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    /// Deletes every entry of the document. Returns the number deleted.
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
                    "DELETE FROM changelogs WHERE document_id = ?1",
                    rusqlite::params![document_id],
                )?;
                tx.commit()?;
                Ok(deleted)
            })
            .await
    }

    /// Best-effort [`create`](Self::create): logs and returns `None` on failure.
    pub async fn start(
        &self,
        file_path: &str,
        request_id: &str,
        comments_snapshot: Option<&str>,
    ) -> Option<i64> {
        match self.create(file_path, request_id, comments_snapshot).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, request_id, "changelog create failed");
                None
            }
        }
    }

    /// Best-effort [`patch`](Self::patch). A `None` entry id (creation failed
    /// earlier) is a silent no-op.
    pub async fn finish(
        &self,
        entry_id: Option<i64>,
        status: ChangelogStatus,
        stream_log: Option<&str>,
        summary: Option<&str>,
    ) {
        let Some(entry_id) = entry_id else {
            return;
        };
        if let Err(e) = self.patch(entry_id, status.as_str(), stream_log, summary).await {
            warn!(error = %e, entry_id, "changelog patch failed");
        }
    }
}
