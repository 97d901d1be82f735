//! Error types for the orchestration layer.
//!
//! Store functions return `tokio_rusqlite::Error` directly; the enums here
//! cover the seams where more than one failure source meets.

use std::path::PathBuf;

/// Failure to start or drive a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("mailbox file {path}: {source}")]
    Mailbox {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode mailbox request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure of a changelog operation.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("unrecognized changelog status `{0}`")]
    UnknownStatus(String),
    #[error(transparent)]
    Db(#[from] tokio_rusqlite::Error),
}

/// Failure of an approve/reject/restore action.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("no edit is awaiting review")]
    NothingPending,
    #[error("snapshot {0} not found")]
    SnapshotNotFound(i64),
    #[error("document {path}: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Db(#[from] tokio_rusqlite::Error),
}
