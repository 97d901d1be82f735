//! End-to-end editing session.
//!
//! [`EditingSession`] is the one object the host owns. It holds the
//! dispatcher (and with it the single active task), the stores, and the
//! review workflow, and it turns settled task events into persisted state.
//! Persistence failures along the task path are logged and swallowed; only
//! dispatch and assistant failures reach the user as task errors.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_rusqlite::Connection;
use tracing::{info, warn};

use crate::changelog::ChangelogRecorder;
use crate::db;
use crate::diff::{compute_line_diff, stats};
use crate::dispatcher::{ChatSubmission, DispatchEvent, EditSubmission, TaskDispatcher, TaskEvent};
use crate::error::ReviewError;
use crate::prompt::resolve_references;
use crate::review::{path_key, write_document, PendingReview, ReviewWorkflow};
use crate::snapshots::SnapshotStore;
use crate::tiers::TierTable;
use crate::transport::Transport;
use crate::types::{ChangelogStatus, ChatRole, HistoryTurn, SnapshotSource, TaskKind, Tier};

/// What the host should show after a settled event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Whole output so far of the running task.
    Stream { kind: TaskKind, text: String },
    /// The assistant finished an edit. `reviewable` is false when the
    /// before/after pair could not be captured, in which case no diff is held.
    EditApplied { request_id: String, summary: String, reviewable: bool },
    ChatReply { session_id: i64, reply: String },
    Failed { kind: TaskKind, message: String },
}

/// A chat task that has been handed to the assistant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatStarted {
    pub request_id: String,
    pub session_id: i64,
}

struct InflightEdit {
    request_id: String,
    document: PathBuf,
    before: Option<String>,
    changelog_id: Option<i64>,
}

struct InflightChat {
    request_id: String,
    session_id: i64,
}

pub struct EditingSession {
    conn: Connection,
    dispatcher: TaskDispatcher,
    changelog: ChangelogRecorder,
    snapshots: SnapshotStore,
    review: ReviewWorkflow,
    edit: Option<InflightEdit>,
    chat: Option<InflightChat>,
}

impl EditingSession {
    /// Creates a session and the receiver its task events arrive on. Feed
    /// every received event back through [`EditingSession::handle`].
    pub fn new(
        conn: Connection,
        transport: Arc<dyn Transport>,
        tiers: TierTable,
    ) -> (Self, mpsc::UnboundedReceiver<DispatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let snapshots = SnapshotStore::new(conn.clone());
        let session = Self {
            dispatcher: TaskDispatcher::new(transport, tiers, tx),
            changelog: ChangelogRecorder::new(conn.clone()),
            review: ReviewWorkflow::new(conn.clone(), snapshots.clone()),
            snapshots,
            conn,
            edit: None,
            chat: None,
        };
        (session, rx)
    }

    pub fn dispatcher(&self) -> &TaskDispatcher {
        &self.dispatcher
    }

    pub fn changelog(&self) -> &ChangelogRecorder {
        &self.changelog
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn pending_review(&self) -> Option<&PendingReview> {
        self.review.pending()
    }

    /// Sends the document's pending comments to the assistant.
    ///
    /// Returns `Ok(None)` without dispatching when there is nothing pending.
    /// Any running task is killed first.
    ///
    /// # Errors
    ///
    /// Returns `tokio_rusqlite::Error` if the pending comments cannot be read.
    pub async fn start_edit(
        &mut self,
        document: &Path,
        tier: Tier,
    ) -> Result<Option<String>, tokio_rusqlite::Error> {
        let key = path_key(document);
        let comments = db::list_pending_comments(&self.conn, &key).await?;
        if comments.is_empty() {
            return Ok(None);
        }

        let before = match tokio::fs::read_to_string(document).await {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(path = %document.display(), error = %e, "could not capture pre-edit content");
                None
            }
        };
        let dir = document.parent().unwrap_or_else(|| Path::new("."));
        let references = resolve_references(dir, &comments).await;

        self.close_superseded().await;
        let request_id = self.dispatcher.submit_edit(
            EditSubmission {
                target: document,
                content: before.as_deref().unwrap_or_default(),
                comments: &comments,
                references: &references,
            },
            tier,
        );

        let comments_json = serde_json::to_string(&comments).ok();
        let changelog_id = self.changelog.start(&key, &request_id, comments_json.as_deref()).await;
        if let Err(e) = db::tag_pending_comments(&self.conn, &key, &request_id).await {
            warn!(error = %e, "tagging comments failed");
        }
        if let Some(before) = &before {
            if let Err(e) = self.snapshots.append(&key, before, SnapshotSource::Save).await {
                warn!(error = %e, "pre-edit snapshot failed");
            }
        }

        self.edit = Some(InflightEdit {
            request_id: request_id.clone(),
            document: document.to_owned(),
            before,
            changelog_id,
        });
        Ok(Some(request_id))
    }

    /// Sends a chat message about `document`, creating a chat session when
    /// `session_id` is `None`. The user message is stored before dispatch.
    ///
    /// # Errors
    ///
    /// Returns `tokio_rusqlite::Error` if the session or message cannot be
    /// stored.
    pub async fn start_chat(
        &mut self,
        document: &Path,
        message: &str,
        session_id: Option<i64>,
        context_selection: Option<&str>,
        tier: Tier,
    ) -> Result<ChatStarted, tokio_rusqlite::Error> {
        let key = path_key(document);
        let session_id = match session_id {
            Some(id) => id,
            None => db::create_chat_session(&self.conn, &key).await?.id,
        };
        let history: Vec<HistoryTurn> = db::list_chat_messages(&self.conn, session_id)
            .await?
            .into_iter()
            .map(|m| HistoryTurn { role: m.role, content: m.content })
            .collect();
        db::append_chat_message(&self.conn, session_id, ChatRole::User, message, context_selection)
            .await?;

        let content = tokio::fs::read_to_string(document).await.ok();
        self.close_superseded().await;
        let request_id = self.dispatcher.submit_chat(
            ChatSubmission {
                document_path: document.to_owned(),
                content,
                session_id,
                message: message.to_owned(),
                context_selection: context_selection.map(str::to_owned),
                history,
            },
            tier,
        );

        self.chat = Some(InflightChat { request_id: request_id.clone(), session_id });
        Ok(ChatStarted { request_id, session_id })
    }

    /// Settles one task event and persists its outcome.
    pub async fn handle(&mut self, ev: DispatchEvent) -> Option<SessionUpdate> {
        match self.dispatcher.settle(ev)? {
            TaskEvent::Data { kind, text } => Some(SessionUpdate::Stream { kind, text }),
            TaskEvent::Complete { kind: TaskKind::Edit, request_id, output, message } => {
                Some(self.finish_edit(&request_id, &output, message).await)
            }
            TaskEvent::Complete { kind: TaskKind::Chat, request_id, output, .. } => {
                self.finish_chat(&request_id, output).await
            }
            TaskEvent::Error { kind, request_id, message } => {
                if kind == TaskKind::Edit {
                    self.fail_edit(&request_id, &message).await;
                } else {
                    self.chat = None;
                }
                Some(SessionUpdate::Failed { kind, message })
            }
        }
    }

    async fn finish_edit(
        &mut self,
        request_id: &str,
        output: &str,
        message: Option<String>,
    ) -> SessionUpdate {
        let Some(edit) = self.edit.take().filter(|e| e.request_id == request_id) else {
            return SessionUpdate::EditApplied {
                request_id: request_id.to_owned(),
                summary: "Changes applied".to_owned(),
                reviewable: false,
            };
        };
        let key = path_key(&edit.document);

        if let Err(e) = db::mark_applied(&self.conn, &key, request_id).await {
            warn!(error = %e, "marking comments applied failed");
        }

        let after = match tokio::fs::read_to_string(&edit.document).await {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(path = %edit.document.display(), error = %e, "could not re-read edited document");
                None
            }
        };

        let summary = match (message, &edit.before, &after) {
            (Some(m), _, _) if !m.is_empty() => m,
            (_, Some(before), Some(after)) => {
                let s = stats(&compute_line_diff(before, after));
                format!(
                    "Changes applied ({} added, {} removed): review changes below",
                    s.added, s.removed
                )
            }
            _ => "Changes applied".to_owned(),
        };
        self.changelog
            .finish(edit.changelog_id, ChangelogStatus::Completed, Some(output), Some(&summary))
            .await;

        if let Some(after) = &after {
            if let Err(e) = self.snapshots.append(&key, after, SnapshotSource::AgentEdit).await {
                warn!(error = %e, "agent-edit snapshot failed");
            }
        }

        let reviewable = match (edit.before, after) {
            (Some(before), Some(after)) => {
                let replaced = self.review.hold(PendingReview {
                    document: edit.document,
                    request_id: request_id.to_owned(),
                    before,
                    after,
                });
                if let Some(old) = replaced {
                    self.keep_superseded(&old).await;
                }
                true
            }
            _ => false,
        };
        info!(id = request_id, reviewable, "edit finished");

        SessionUpdate::EditApplied { request_id: request_id.to_owned(), summary, reviewable }
    }

    /// Settles a review that a newer edit replaced before it was decided. The
    /// newer edit started from the older one's output, so the older changes
    /// stay and their comments resolve as if approved.
    async fn keep_superseded(&self, old: &PendingReview) {
        warn!(id = %old.request_id, "undecided review replaced by a newer edit; keeping its changes");
        let key = path_key(&old.document);
        if let Err(e) = db::delete_applied(&self.conn, &key, &old.request_id).await {
            warn!(error = %e, "resolving superseded comments failed");
        }
    }

    async fn fail_edit(&mut self, request_id: &str, message: &str) {
        let Some(edit) = self.edit.take().filter(|e| e.request_id == request_id) else {
            return;
        };
        let transcript = self.dispatcher.stream(TaskKind::Edit).to_owned();
        let transcript = Some(transcript.as_str()).filter(|t| !t.is_empty());
        self.changelog
            .finish(edit.changelog_id, ChangelogStatus::Error, transcript, Some(message))
            .await;
    }

    async fn finish_chat(&mut self, request_id: &str, output: String) -> Option<SessionUpdate> {
        let chat = self.chat.take().filter(|c| c.request_id == request_id)?;
        let reply = output.trim().to_owned();
        if let Err(e) =
            db::append_chat_message(&self.conn, chat.session_id, ChatRole::Assistant, &reply, None).await
        {
            warn!(error = %e, "storing assistant reply failed");
        }
        Some(SessionUpdate::ChatReply { session_id: chat.session_id, reply })
    }

    /// Records a killed or superseded edit as an error in the changelog.
    async fn close_superseded(&mut self) {
        if let Some(edit) = self.edit.take() {
            self.changelog
                .finish(edit.changelog_id, ChangelogStatus::Error, None, Some("Cancelled"))
                .await;
        }
        self.chat = None;
    }

    /// Kills the running task. Its comments stay pending for resubmission.
    pub async fn cancel(&mut self) -> bool {
        let cancelled = self.dispatcher.cancel().is_some();
        self.close_superseded().await;
        cancelled
    }

    /// Accepts the held edit.
    ///
    /// # Errors
    ///
    /// See [`ReviewWorkflow::approve`].
    pub async fn approve(&mut self) -> Result<PendingReview, ReviewError> {
        self.review.approve().await
    }

    /// Rejects the held edit and restores the pre-edit content.
    ///
    /// # Errors
    ///
    /// See [`ReviewWorkflow::reject`].
    pub async fn reject(&mut self) -> Result<PendingReview, ReviewError> {
        self.review.reject().await
    }

    /// Writes snapshot `snapshot_id` back to `document` and records a
    /// `restore` snapshot. Returns the restored content.
    ///
    /// # Errors
    ///
    /// [`ReviewError::SnapshotNotFound`] when the id is unknown or belongs to
    /// another document; I/O and database errors otherwise.
    pub async fn restore_snapshot(
        &mut self,
        document: &Path,
        snapshot_id: i64,
    ) -> Result<String, ReviewError> {
        let key = path_key(document);
        let owner = db::find_document(&self.conn, &key).await?.map(|d| d.id);
        let snapshot = self
            .snapshots
            .get(snapshot_id)
            .await?
            .filter(|s| Some(s.document_id) == owner)
            .ok_or(ReviewError::SnapshotNotFound(snapshot_id))?;

        write_document(document, &snapshot.content).await?;
        if let Err(e) = self.snapshots.append(&key, &snapshot.content, SnapshotSource::Restore).await {
            warn!(error = %e, "restore snapshot failed");
        }
        info!(id = snapshot_id, path = %document.display(), "snapshot restored");
        Ok(snapshot.content)
    }

    /// Writes `content` to `document` and records a `save` snapshot.
    ///
    /// # Errors
    ///
    /// [`ReviewError::Document`] if the write fails. Snapshot failures are
    /// logged only.
    pub async fn save_document(&mut self, document: &Path, content: &str) -> Result<(), ReviewError> {
        write_document(document, content).await?;
        if let Err(e) = self.snapshots.append(&path_key(document), content, SnapshotSource::Save).await {
            warn!(error = %e, "save snapshot failed");
        }
        Ok(())
    }
}
