//! Human review of a completed edit.
//!
//! A finished edit is held as a before/after pair until the user decides.
//! Decisions cover the whole edit: approve keeps the file as the assistant
//! wrote it, reject puts "before" back.

use std::path::{Path, PathBuf};

use tokio_rusqlite::Connection;
use tracing::{info, warn};

use crate::db;
use crate::diff::{compute_line_diff, DiffLine};
use crate::error::ReviewError;
use crate::snapshots::SnapshotStore;
use crate::types::SnapshotSource;

/// An edit awaiting a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReview {
    pub document: PathBuf,
    pub request_id: String,
    /// Content captured at dispatch.
    pub before: String,
    /// Content re-read after completion.
    pub after: String,
}

impl PendingReview {
    pub fn diff(&self) -> Vec<DiffLine> {
        compute_line_diff(&self.before, &self.after)
    }
}

pub struct ReviewWorkflow {
    conn: Connection,
    snapshots: SnapshotStore,
    pending: Option<PendingReview>,
}

impl ReviewWorkflow {
    pub fn new(conn: Connection, snapshots: SnapshotStore) -> Self {
        Self { conn, snapshots, pending: None }
    }

    /// Holds `review` for a decision. Returns the earlier undecided review it
    /// replaces, whose comments the caller must settle.
    pub fn hold(&mut self, review: PendingReview) -> Option<PendingReview> {
        self.pending.replace(review)
    }

    pub fn pending(&self) -> Option<&PendingReview> {
        self.pending.as_ref()
    }

    /// Accepts the edit: the file stays as written and the comments that drove
    /// it are deleted as resolved. Comments of other edits are untouched.
    ///
    /// # Errors
    ///
    /// [`ReviewError::NothingPending`] without a held review; a database error
    /// leaves the review held so the decision can be retried.
    pub async fn approve(&mut self) -> Result<PendingReview, ReviewError> {
        let review = self.pending.as_ref().ok_or(ReviewError::NothingPending)?;
        let removed =
            db::delete_applied(&self.conn, &path_key(&review.document), &review.request_id).await?;
        info!(id = %review.request_id, comments = removed, "edit approved");
        self.pending.take().ok_or(ReviewError::NothingPending)
    }

    /// Rejects the edit: writes "before" back, returns the comments it applied
    /// to pending and records a `restore` snapshot. The returned review's
    /// `before` is the content now on disk.
    ///
    /// # Errors
    ///
    /// [`ReviewError::NothingPending`] without a held review. A failed write
    /// or comment update leaves the review held.
    pub async fn reject(&mut self) -> Result<PendingReview, ReviewError> {
        let review = self.pending.as_ref().ok_or(ReviewError::NothingPending)?;
        let key = path_key(&review.document);

        write_document(&review.document, &review.before).await?;
        let reverted = db::revert_applied(&self.conn, &key, &review.request_id).await?;
        if let Err(e) = self.snapshots.append(&key, &review.before, SnapshotSource::Restore).await {
            warn!(error = %e, "restore snapshot failed");
        }
        info!(id = %review.request_id, comments = reverted, "edit rejected");
        self.pending.take().ok_or(ReviewError::NothingPending)
    }
}

/// Key under which a document's rows are stored.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub(crate) async fn write_document(path: &Path, content: &str) -> Result<(), ReviewError> {
    tokio::fs::write(path, content).await.map_err(|source| ReviewError::Document {
        path: path.to_owned(),
        source,
    })
}
