//! File-mailbox delivery for hosts that cannot spawn the assistant.
//!
//! An external watcher picks up the request file, runs the assistant, keeps
//! the stream file replaced with the whole output so far, and finally flips
//! the status file to `completed` or `error`. This side only writes the
//! request and polls. The files are shared by every task of one kind, which
//! is safe only because the dispatcher never has two tasks in flight.
//!
//! `send` only encodes; the files are written by the spawned poll task, so
//! the caller's thread never touches the filesystem. A failed write arrives
//! as the task's single `Error` event.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{KillSwitch, TaskHandle, Transport, TransportEvent, TransportRequest};
use crate::error::TransportError;
use crate::types::HistoryTurn;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

const FALLBACK_ERROR: &str = "Failed to apply changes";

/// The three files of one mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxPaths {
    pub request: PathBuf,
    pub status: PathBuf,
    pub stream: PathBuf,
}

impl MailboxPaths {
    /// Edit-task mailbox under `dir`.
    pub fn edit(dir: &Path) -> Self {
        Self {
            request: dir.join("komma-comments.json"),
            status: dir.join("komma-status.json"),
            stream: dir.join("komma-stream.log"),
        }
    }

    /// Chat-task mailbox under `dir`.
    pub fn chat(dir: &Path) -> Self {
        Self {
            request: dir.join("komma-chat.json"),
            status: dir.join("komma-chat-response.json"),
            stream: dir.join("komma-chat-stream.log"),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EditRequestFile<'a> {
    id: &'a str,
    timestamp: u64,
    file_path: &'a str,
    prompt: &'a str,
    status: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequestFile<'a> {
    id: &'a str,
    timestamp: u64,
    session_id: i64,
    document_path: &'a str,
    message: &'a str,
    context_selection: Option<&'a str>,
    history: &'a [HistoryTurn],
    status: &'static str,
}

/// Watchers that do not echo the request id leave `id` out.
#[derive(Debug, Serialize, Deserialize)]
struct StatusFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MailboxTransport {
    edit: MailboxPaths,
    chat: MailboxPaths,
    poll_interval: Duration,
}

impl MailboxTransport {
    /// Mailbox with the standard file names under `dir`.
    pub fn new(dir: &Path, poll_interval: Duration) -> Self {
        Self::with_paths(MailboxPaths::edit(dir), MailboxPaths::chat(dir), poll_interval)
    }

    pub fn with_paths(edit: MailboxPaths, chat: MailboxPaths, poll_interval: Duration) -> Self {
        Self { edit, chat, poll_interval }
    }

    fn paths_for(&self, request: &TransportRequest) -> &MailboxPaths {
        match request {
            TransportRequest::Edit { .. } => &self.edit,
            TransportRequest::Chat { .. } => &self.chat,
        }
    }
}

impl Transport for MailboxTransport {
    fn name(&self) -> &'static str {
        "mailbox"
    }

    fn send(&self, request: TransportRequest) -> Result<TaskHandle, TransportError> {
        let paths = self.paths_for(&request).clone();
        let id = request.id().to_owned();
        let timestamp = now_millis();

        let body = match &request {
            TransportRequest::Edit { target, prompt, .. } => {
                serde_json::to_vec_pretty(&EditRequestFile {
                    id: &id,
                    timestamp,
                    file_path: &target.to_string_lossy(),
                    prompt,
                    status: "pending",
                })?
            }
            TransportRequest::Chat {
                session_id,
                document_path,
                message,
                context_selection,
                history,
                ..
            } => serde_json::to_vec_pretty(&ChatRequestFile {
                id: &id,
                timestamp,
                session_id: *session_id,
                document_path: &document_path.to_string_lossy(),
                message,
                context_selection: context_selection.as_deref(),
                history,
                status: "pending",
            })?,
        };
        let status = serde_json::to_vec(&StatusFile {
            id: Some(id.clone()),
            status: "pending".to_owned(),
            message: None,
        })?;

        let (tx, events) = mpsc::unbounded_channel();
        let (killer, kill_rx) = KillSwitch::pair();
        let interval = self.poll_interval;
        tokio::spawn(async move {
            let mut kill_rx = kill_rx;
            let written = tokio::select! {
                _ = &mut kill_rx => {
                    debug!(id = %id, "mailbox task killed before delivery");
                    return;
                }
                written = deliver(&paths, &body, &status) => written,
            };
            if let Err(e) = written {
                warn!(id = %id, error = %e, "mailbox request not written");
                let _ = tx.send(TransportEvent::Error { message: e.to_string() });
                return;
            }
            info!(id = %id, request = %paths.request.display(), "mailbox request written");
            poll_mailbox(paths, id, interval, tx, kill_rx).await;
        });

        Ok(TaskHandle { events, killer })
    }
}

/// Writes the request. The stream is cleared first so the first poll cannot
/// show a prior task's residue, and the pending status goes last.
async fn deliver(paths: &MailboxPaths, body: &[u8], status: &[u8]) -> Result<(), TransportError> {
    write_file(&paths.stream, b"").await?;
    write_file(&paths.request, body).await?;
    write_file(&paths.status, status).await
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<(), TransportError> {
    tokio::fs::write(path, contents).await.map_err(|source| TransportError::Mailbox {
        path: path.to_owned(),
        source,
    })
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

enum Outcome {
    Completed(Option<String>),
    Failed(String),
}

/// Polls until the status file reports an outcome or the kill switch fires.
/// Each tick does one whole-file read of the stream and of the status file.
async fn poll_mailbox(
    paths: MailboxPaths,
    id: String,
    interval: Duration,
    tx: mpsc::UnboundedSender<TransportEvent>,
    mut kill_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = String::new();

    loop {
        tokio::select! {
            _ = &mut kill_rx => {
                debug!(id = %id, "mailbox polling stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        relay_stream(&paths.stream, &mut last, &tx).await;

        let Some(outcome) = read_outcome(&paths.status, &id).await else {
            continue;
        };
        // The watcher writes the stream before the status, so read once more
        // to pick up output that landed between the two reads above.
        relay_stream(&paths.stream, &mut last, &tx).await;

        let event = match outcome {
            Outcome::Completed(message) => TransportEvent::Complete { output: last, message },
            Outcome::Failed(message) => TransportEvent::Error { message },
        };
        info!(id = %id, "mailbox task finished");
        let _ = tx.send(event);
        return;
    }
}

/// Relays the stream file when it holds something new.
async fn relay_stream(path: &Path, last: &mut String, tx: &mpsc::UnboundedSender<TransportEvent>) {
    let Some(text) = read_whole(path).await else {
        return;
    };
    if !text.is_empty() && text != *last {
        *last = text.clone();
        let _ = tx.send(TransportEvent::Data(text));
    }
}

/// Whole-file read. A missing file is idle, not an error.
async fn read_whole(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(s) => Some(s),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "mailbox read failed");
            None
        }
    }
}

/// Reads the status file. Missing, unparseable, still pending, or carrying
/// another request's id all read as "no outcome yet". A status without an
/// id is taken as ours.
async fn read_outcome(path: &Path, id: &str) -> Option<Outcome> {
    let raw = read_whole(path).await?;
    let status: StatusFile = match serde_json::from_str(&raw) {
        Ok(s) => s,
        Err(e) => {
            debug!(error = %e, "status file not parseable yet");
            return None;
        }
    };
    if status.id.as_deref().is_some_and(|other| other != id) {
        return None;
    }
    match status.status.as_str() {
        "completed" | "complete" => Some(Outcome::Completed(status.message)),
        "error" => Some(Outcome::Failed(
            status.message.filter(|m| !m.is_empty()).unwrap_or_else(|| FALLBACK_ERROR.to_owned()),
        )),
        _ => None,
    }
}
