//! Single-flight task dispatch.
//!
//! At most one task is active. Submitting while one runs kills it first:
//! last request wins, nothing is queued. Every submit or cancel bumps a
//! generation counter; relay tasks stop forwarding as soon as their
//! generation is no longer current, and [`TaskDispatcher::settle`] rechecks
//! it, so a late callback from a killed task is never surfaced.
//!
//! `submit_*` never waits on the assistant. Progress arrives as
//! [`DispatchEvent`]s on the channel handed to [`TaskDispatcher::new`]; the
//! owner feeds each one back through `settle`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregator::StreamAggregator;
use crate::prompt::{build_chat_prompt, build_edit_prompt, Reference};
use crate::tiers::TierTable;
use crate::transport::{KillSwitch, Transport, TransportEvent, TransportRequest};
use crate::types::{Comment, HistoryTurn, TaskKind, TaskStatus, Tier};

/// Message surfaced when a task could not be handed to the assistant.
pub const COMMUNICATION_FAILURE: &str = "Failed to communicate with the assistant";

/// Raw transport event tagged with the generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEvent {
    pub generation: u64,
    pub kind: TaskKind,
    pub event: TransportEvent,
}

/// A settled event of the current task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// The whole output so far; never shorter than the previous `Data`.
    Data { kind: TaskKind, text: String },
    Complete {
        kind: TaskKind,
        request_id: String,
        output: String,
        message: Option<String>,
    },
    Error {
        kind: TaskKind,
        request_id: String,
        message: String,
    },
}

/// Inputs of an edit task.
#[derive(Debug, Clone, Copy)]
pub struct EditSubmission<'a> {
    pub target: &'a Path,
    pub content: &'a str,
    pub comments: &'a [Comment],
    pub references: &'a [Reference],
}

/// Inputs of a chat task.
#[derive(Debug, Clone)]
pub struct ChatSubmission {
    pub document_path: PathBuf,
    /// `None` when the document could not be read.
    pub content: Option<String>,
    pub session_id: i64,
    pub message: String,
    pub context_selection: Option<String>,
    pub history: Vec<HistoryTurn>,
}

struct ActiveTask {
    generation: u64,
    kind: TaskKind,
    request_id: String,
    status: TaskStatus,
    // None when the transport failed to start.
    killer: Option<KillSwitch>,
}

pub struct TaskDispatcher {
    transport: Arc<dyn Transport>,
    tiers: TierTable,
    generation: Arc<AtomicU64>,
    active: Option<ActiveTask>,
    events_tx: mpsc::UnboundedSender<DispatchEvent>,
    aggregator: StreamAggregator,
}

impl TaskDispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        tiers: TierTable,
        events_tx: mpsc::UnboundedSender<DispatchEvent>,
    ) -> Self {
        Self {
            transport,
            tiers,
            generation: Arc::new(AtomicU64::new(0)),
            active: None,
            events_tx,
            aggregator: StreamAggregator::new(),
        }
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Starts an edit task, killing any active task first. Returns the new
    /// request id.
    pub fn submit_edit(&mut self, edit: EditSubmission<'_>, tier: Tier) -> String {
        let id = Uuid::new_v4().to_string();
        let prompt = build_edit_prompt(edit.target, edit.content, edit.comments, edit.references, tier);
        let request = TransportRequest::Edit {
            id: id.clone(),
            target: edit.target.to_owned(),
            prompt,
            profile: self.tiers.profile(tier).clone(),
        };
        self.start(request);
        id
    }

    /// Starts a chat task, killing any active task first. Returns the new
    /// request id.
    pub fn submit_chat(&mut self, chat: ChatSubmission, tier: Tier) -> String {
        let id = Uuid::new_v4().to_string();
        let prompt = build_chat_prompt(
            &chat.document_path,
            chat.content.as_deref(),
            chat.context_selection.as_deref(),
            &chat.history,
            &chat.message,
        );
        let request = TransportRequest::Chat {
            id: id.clone(),
            session_id: chat.session_id,
            document_path: chat.document_path,
            message: chat.message,
            context_selection: chat.context_selection,
            history: chat.history,
            prompt,
            profile: self.tiers.profile(tier).for_chat(),
        };
        self.start(request);
        id
    }

    fn start(&mut self, request: TransportRequest) {
        self.kill_active();
        let generation = self.bump();
        let kind = request.kind();
        let request_id = request.id().to_owned();
        self.aggregator.start(kind);

        let killer = match self.transport.send(request) {
            Ok(handle) => {
                info!(
                    id = %request_id,
                    kind = kind.as_str(),
                    generation,
                    transport = self.transport.name(),
                    "task dispatched"
                );
                tokio::spawn(relay(
                    handle.events,
                    generation,
                    kind,
                    Arc::clone(&self.generation),
                    self.events_tx.clone(),
                ));
                Some(handle.killer)
            }
            Err(e) => {
                warn!(id = %request_id, error = %e, "task dispatch failed");
                let _ = self.events_tx.send(DispatchEvent {
                    generation,
                    kind,
                    event: TransportEvent::Error { message: COMMUNICATION_FAILURE.to_owned() },
                });
                None
            }
        };

        self.active = Some(ActiveTask {
            generation,
            kind,
            request_id,
            status: TaskStatus::Dispatched,
            killer,
        });
    }

    /// Applies one event to the active task.
    ///
    /// Returns `None` for events of a superseded or cancelled task and for
    /// data that would not grow the visible output. A terminal event clears
    /// the active task.
    pub fn settle(&mut self, ev: DispatchEvent) -> Option<TaskEvent> {
        if ev.generation != self.generation.load(Ordering::Acquire) {
            debug!(generation = ev.generation, "discarding stale task event");
            return None;
        }
        let active = self.active.as_mut().filter(|a| a.generation == ev.generation)?;
        let kind = active.kind;

        match ev.event {
            TransportEvent::Data(text) => {
                active.status = TaskStatus::Streaming;
                let text = self.aggregator.update(kind, &text)?;
                debug!(kind = kind.as_str(), len = text.len(), "task output");
                Some(TaskEvent::Data { kind, text: text.to_owned() })
            }
            TransportEvent::Complete { output, message } => {
                let task = self.active.take()?;
                self.aggregator.update(kind, &output);
                info!(id = %task.request_id, kind = kind.as_str(), "task completed");
                Some(TaskEvent::Complete { kind, request_id: task.request_id, output, message })
            }
            TransportEvent::Error { message } => {
                let task = self.active.take()?;
                info!(id = %task.request_id, kind = kind.as_str(), %message, "task failed");
                Some(TaskEvent::Error { kind, request_id: task.request_id, message })
            }
        }
    }

    /// Kills the active task. Anything it still delivers is discarded.
    /// Returns the cancelled task's kind and request id.
    pub fn cancel(&mut self) -> Option<(TaskKind, String)> {
        self.bump();
        let task = self.kill_active()?;
        info!(id = %task.1, "task cancelled");
        Some(task)
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Kind, request id and status of the active task.
    pub fn active(&self) -> Option<(TaskKind, &str, TaskStatus)> {
        self.active.as_ref().map(|a| (a.kind, a.request_id.as_str(), a.status))
    }

    /// Current output buffer for `kind`.
    pub fn stream(&self, kind: TaskKind) -> &str {
        self.aggregator.snapshot(kind)
    }

    fn bump(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn kill_active(&mut self) -> Option<(TaskKind, String)> {
        let task = self.active.take()?;
        if let Some(killer) = task.killer {
            killer.kill();
        }
        Some((task.kind, task.request_id))
    }
}

/// Forwards transport events while `generation` is current.
///
/// A transport that goes away without a terminal event is reported as a
/// communication failure so the task never stays active forever.
async fn relay(
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    generation: u64,
    kind: TaskKind,
    current: Arc<AtomicU64>,
    tx: mpsc::UnboundedSender<DispatchEvent>,
) {
    while let Some(event) = events.recv().await {
        if current.load(Ordering::Acquire) != generation {
            return;
        }
        let terminal = event.is_terminal();
        if tx.send(DispatchEvent { generation, kind, event }).is_err() || terminal {
            return;
        }
    }
    if current.load(Ordering::Acquire) == generation {
        let _ = tx.send(DispatchEvent {
            generation,
            kind,
            event: TransportEvent::Error { message: COMMUNICATION_FAILURE.to_owned() },
        });
    }
}
