//! Delivery of a task to the external assistant.
//!
//! Two implementations satisfy one contract: [`ProcessTransport`] spawns the
//! assistant directly, [`MailboxTransport`] hands requests to an external
//! watcher through files. The host picks one at startup and the dispatcher
//! only ever sees `Arc<dyn Transport>`.
//!
//! Every data event is cumulative: it carries the whole output so far.

mod mailbox;
mod process;

pub use mailbox::{MailboxPaths, MailboxTransport, DEFAULT_POLL_INTERVAL};
pub use process::ProcessTransport;

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};

use crate::error::TransportError;
use crate::tiers::TierProfile;
use crate::types::{HistoryTurn, TaskKind};

/// A task ready to be delivered.
#[derive(Debug, Clone)]
pub enum TransportRequest {
    Edit {
        id: String,
        target: PathBuf,
        prompt: String,
        profile: TierProfile,
    },
    Chat {
        id: String,
        session_id: i64,
        document_path: PathBuf,
        message: String,
        context_selection: Option<String>,
        history: Vec<HistoryTurn>,
        prompt: String,
        profile: TierProfile,
    },
}

impl TransportRequest {
    pub fn id(&self) -> &str {
        match self {
            Self::Edit { id, .. } | Self::Chat { id, .. } => id,
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Edit { .. } => TaskKind::Edit,
            Self::Chat { .. } => TaskKind::Chat,
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            Self::Edit { prompt, .. } | Self::Chat { prompt, .. } => prompt,
        }
    }

    pub fn profile(&self) -> &TierProfile {
        match self {
            Self::Edit { profile, .. } | Self::Chat { profile, .. } => profile,
        }
    }
}

/// Progress of one delivered task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Whole output so far. Replaces, never appends to, the previous one.
    Data(String),
    /// The assistant finished. `message` is the status payload, if any.
    Complete { output: String, message: Option<String> },
    Error { message: String },
}

impl TransportEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransportEvent::Data(_))
    }
}

/// Stop handle for a delivered task. Dropping it stops the task too.
#[derive(Debug)]
pub struct KillSwitch(oneshot::Sender<()>);

impl KillSwitch {
    /// A switch and the receiver the transport's task watches.
    pub fn pair() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    /// Best-effort stop. No further events are delivered once the task
    /// observes it.
    pub fn kill(self) {
        let _ = self.0.send(());
    }
}

/// Handle returned by [`Transport::send`].
#[derive(Debug)]
pub struct TaskHandle {
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    pub killer: KillSwitch,
}

/// Send/observe/kill contract shared by both transports.
///
/// `send` must be called from within a tokio runtime: implementations spawn
/// their I/O and return immediately. An `Err` means nothing was started.
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Starts delivering `request`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the task could not be started.
    fn send(&self, request: TransportRequest) -> Result<TaskHandle, TransportError>;
}
