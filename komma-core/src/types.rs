use serde::{Deserialize, Serialize};

/// A document tracked by komma, keyed by its absolute file path.
///
/// Rows are created lazily the first time any store operation references the
/// path; `last_opened_at` is refreshed on every subsequent reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: i64,
    pub file_path: String,
    pub last_opened_at: i64, // Unix timestamp seconds
    pub created_at: i64,
}

/// Lifecycle of a review comment.
///
/// `Pending` → `Applied` when the assistant finishes an edit task. On review,
/// `Applied` comments are either deleted (approve) or reverted to `Pending`
/// (reject) so they can be resubmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    Pending,
    Applied,
}

impl CommentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CommentStatus::Pending => "pending",
            CommentStatus::Applied => "applied",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CommentStatus::Pending),
            "applied" => Some(CommentStatus::Applied),
            _ => None,
        }
    }
}

/// An edit instruction anchored to a text selection within a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub id: i64,
    pub document_id: i64,
    pub selected_text: String,
    pub instruction: String,
    pub line_hint: Option<String>,
    pub status: CommentStatus,
    /// Request id of the edit task that last carried this comment.
    pub request_id: Option<String>,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
}

/// Status of a changelog entry. Entries start `Pending` and are patched to
/// exactly one terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangelogStatus {
    Pending,
    Completed,
    Error,
}

impl ChangelogStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangelogStatus::Pending => "pending",
            ChangelogStatus::Completed => "completed",
            ChangelogStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ChangelogStatus::Pending),
            "completed" => Some(ChangelogStatus::Completed),
            "error" => Some(ChangelogStatus::Error),
            _ => None,
        }
    }
}

/// Audit record of one edit task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogEntry {
    pub id: i64,
    pub document_id: i64,
    pub request_id: String,
    pub summary: Option<String>,
    /// JSON array of the comments that triggered the task.
    pub comments_snapshot: Option<String>,
    pub status: ChangelogStatus,
    pub stream_log: Option<String>,
    pub created_at: i64,
    /// Set exactly once, by the first terminal patch.
    pub completed_at: Option<i64>,
}

/// What produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Save,
    AgentEdit,
    Restore,
}

impl SnapshotSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotSource::Save => "save",
            SnapshotSource::AgentEdit => "agent-edit",
            SnapshotSource::Restore => "restore",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "save" => Some(SnapshotSource::Save),
            "agent-edit" => Some(SnapshotSource::AgentEdit),
            "restore" => Some(SnapshotSource::Restore),
            _ => None,
        }
    }
}

/// Snapshot metadata returned by listings. Content is fetched separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub id: i64,
    pub source: SnapshotSource,
    pub created_at: i64,
}

/// A full snapshot row including the document content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: i64,
    pub document_id: i64,
    pub content: String,
    pub source: SnapshotSource,
    pub created_at: i64,
}

/// Outcome of appending a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted { id: i64 },
    /// Content matched the latest snapshot for the document; nothing written.
    Skipped,
}

impl AppendOutcome {
    pub fn is_skipped(self) -> bool {
        matches!(self, AppendOutcome::Skipped)
    }
}

/// A chat conversation attached to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    pub id: i64,
    pub document_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(ChatRole::User),
            "assistant" => Some(ChatRole::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: i64,
    pub role: ChatRole,
    pub content: String,
    pub context_selection: Option<String>,
    pub created_at: i64,
}

/// One prior turn handed to the assistant as conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: ChatRole,
    pub content: String,
}

/// Kind of task routed through the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Edit,
    Chat,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Edit => "edit",
            TaskKind::Chat => "chat",
        }
    }
}

/// Observable state of the active task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Dispatched,
    Streaming,
    Completed,
    Error,
}

/// Capability/speed tier requested for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Fastest, most restricted: low turn cap, narrow tool set.
    Fast,
    #[default]
    Default,
    /// Most capable, no turn cap.
    Max,
}

impl Tier {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fast" => Some(Tier::Fast),
            "default" => Some(Tier::Default),
            "max" => Some(Tier::Max),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        for s in [ChangelogStatus::Pending, ChangelogStatus::Completed, ChangelogStatus::Error] {
            assert_eq!(ChangelogStatus::parse(s.as_str()), Some(s));
        }
        for s in [SnapshotSource::Save, SnapshotSource::AgentEdit, SnapshotSource::Restore] {
            assert_eq!(SnapshotSource::parse(s.as_str()), Some(s));
        }
        assert_eq!(ChangelogStatus::parse("complete"), None);
        assert_eq!(Tier::parse("turbo"), None);
    }

    #[test]
    fn history_turn_serializes_lowercase_role() {
        let turn = HistoryTurn { role: ChatRole::Assistant, content: "hi".into() };
        let json = serde_json::to_string(&turn).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
