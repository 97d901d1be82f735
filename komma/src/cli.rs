//! Command-line surface and the one-shot subcommands.
//!
//! `review` opens the interactive screen (see `main.rs`); every other
//! subcommand runs against the database, prints, and exits.

use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use komma_core::db;
use komma_core::diff::{compute_line_diff, stats, DiffKind};
use komma_core::review::path_key;
use komma_core::session::{EditingSession, SessionUpdate};
use komma_core::snapshots::SnapshotStore;
use komma_core::changelog::ChangelogRecorder;
use komma_core::types::Tier;
use tokio_rusqlite::Connection;

use crate::config::KommaConfig;

#[derive(Debug, Parser)]
#[command(name = "komma", version, about = "Review-comment driven document editing with an AI assistant")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Open the review screen for a document.
    Review {
        file: PathBuf,
        #[arg(long, value_parser = parse_tier, default_value = "default")]
        tier: Tier,
    },
    /// Add, list, or delete review comments.
    Comment {
        #[command(subcommand)]
        action: CommentAction,
    },
    /// Ask the assistant about a document; the reply streams to stdout.
    Chat {
        file: PathBuf,
        message: String,
        /// Continue an existing chat session.
        #[arg(long)]
        session: Option<i64>,
        /// Text the question is about.
        #[arg(long)]
        selection: Option<String>,
        #[arg(long, value_parser = parse_tier, default_value = "default")]
        tier: Tier,
    },
    /// List the chat sessions of a document.
    Sessions { file: PathBuf },
    /// Show the edit changelog of a document, newest first.
    History {
        file: PathBuf,
        /// Delete every entry instead of listing.
        #[arg(long)]
        clear: bool,
    },
    /// List the snapshots of a document, newest first.
    Snapshots {
        file: PathBuf,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Delete every snapshot instead of listing.
        #[arg(long)]
        clear: bool,
    },
    /// Print one snapshot.
    Snapshot {
        id: i64,
        /// Print the diff against the previous snapshot of the same document.
        #[arg(long)]
        diff: bool,
    },
    /// Write a snapshot back to its document.
    Restore { file: PathBuf, id: i64 },
}

#[derive(Debug, Subcommand)]
pub enum CommentAction {
    Add {
        file: PathBuf,
        /// The text the comment is anchored to.
        #[arg(long)]
        selection: String,
        /// What the assistant should do with it.
        #[arg(long)]
        instruction: String,
        /// Approximate line number, passed on as a hint.
        #[arg(long)]
        line: Option<String>,
    },
    List { file: PathBuf },
    Delete { id: i64 },
}

fn parse_tier(s: &str) -> Result<Tier, String> {
    Tier::parse(s).ok_or_else(|| format!("unknown tier `{s}` (expected fast, default or max)"))
}

pub fn other<E>(e: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::Other, e)
}

/// Documents are keyed by absolute path, so every path is canonicalized.
pub fn document_path(file: &Path) -> io::Result<PathBuf> {
    std::fs::canonicalize(file)
        .map_err(|e| io::Error::new(e.kind(), format!("{}: {e}", file.display())))
}

/// Runs every subcommand except `review`.
pub async fn run(command: Command, conn: Connection, config: &KommaConfig) -> io::Result<()> {
    match command {
        Command::Review { .. } => Err(other("review runs on the interactive screen")),
        Command::Comment { action } => comment(action, &conn).await,
        Command::Chat { file, message, session, selection, tier } => {
            chat(&document_path(&file)?, &message, session, selection.as_deref(), tier, conn, config)
                .await
        }
        Command::Sessions { file } => sessions(&document_path(&file)?, &conn).await,
        Command::History { file, clear } => history(&document_path(&file)?, clear, conn).await,
        Command::Snapshots { file, limit, clear } => {
            snapshots(&document_path(&file)?, limit, clear, conn).await
        }
        Command::Snapshot { id, diff } => snapshot(id, diff, conn).await,
        Command::Restore { file, id } => {
            let doc = document_path(&file)?;
            let (mut session, _rx) =
                EditingSession::new(conn, config.transport.build(), config.tiers.clone());
            session.restore_snapshot(&doc, id).await.map_err(other)?;
            println!("restored snapshot {id} to {}", doc.display());
            Ok(())
        }
    }
}

async fn comment(action: CommentAction, conn: &Connection) -> io::Result<()> {
    match action {
        CommentAction::Add { file, selection, instruction, line } => {
            let doc = document_path(&file)?;
            let c = db::create_comment(conn, &path_key(&doc), &selection, &instruction, line.as_deref())
                .await
                .map_err(other)?;
            println!("added comment {}", c.id);
        }
        CommentAction::List { file } => {
            let doc = document_path(&file)?;
            for c in db::list_comments(conn, &path_key(&doc)).await.map_err(other)? {
                let hint = c.line_hint.map(|h| format!(" (line {h})")).unwrap_or_default();
                println!("{:>4}  {:<8} {}{hint}", c.id, c.status.as_str(), first_line(&c.selected_text));
                println!("      -> {}", c.instruction);
            }
        }
        CommentAction::Delete { id } => {
            if !db::delete_comment(conn, id).await.map_err(other)? {
                return Err(other(format!("comment {id} not found")));
            }
            println!("deleted comment {id}");
        }
    }
    Ok(())
}

async fn chat(
    doc: &Path,
    message: &str,
    session_id: Option<i64>,
    selection: Option<&str>,
    tier: Tier,
    conn: Connection,
    config: &KommaConfig,
) -> io::Result<()> {
    let (mut session, mut rx) =
        EditingSession::new(conn, config.transport.build(), config.tiers.clone());
    let started = session
        .start_chat(doc, message, session_id, selection, tier)
        .await
        .map_err(other)?;

    // Stream text is cumulative; print only what is new.
    let mut printed = 0;
    while let Some(ev) = rx.recv().await {
        match session.handle(ev).await {
            Some(SessionUpdate::Stream { text, .. }) => {
                if let Some(fresh) = text.get(printed..) {
                    print!("{fresh}");
                    io::stdout().flush()?;
                }
                printed = text.len();
            }
            Some(SessionUpdate::ChatReply { reply, .. }) => {
                if printed == 0 {
                    println!("{reply}");
                } else {
                    println!();
                }
                eprintln!("session {}", started.session_id);
                return Ok(());
            }
            Some(SessionUpdate::Failed { message, .. }) => return Err(other(message)),
            Some(SessionUpdate::EditApplied { .. }) | None => {}
        }
    }
    Err(other("assistant task ended without a reply"))
}

async fn sessions(doc: &Path, conn: &Connection) -> io::Result<()> {
    for s in db::list_chat_sessions(conn, &path_key(doc)).await.map_err(other)? {
        println!("{:>4}  updated {}", s.id, age(s.updated_at));
    }
    Ok(())
}

async fn history(doc: &Path, clear: bool, conn: Connection) -> io::Result<()> {
    let recorder = ChangelogRecorder::new(conn);
    let key = path_key(doc);
    if clear {
        let n = recorder.clear(&key).await.map_err(other)?;
        println!("removed {n} changelog entries");
        return Ok(());
    }
    for e in recorder.list(&key).await.map_err(other)? {
        let summary = e.summary.as_deref().map(first_line).unwrap_or("");
        println!("{:>4}  {:<9} {:<10} {summary}", e.id, e.status.as_str(), age(e.created_at));
    }
    Ok(())
}

async fn snapshots(doc: &Path, limit: usize, clear: bool, conn: Connection) -> io::Result<()> {
    let store = SnapshotStore::new(conn);
    let key = path_key(doc);
    if clear {
        let n = store.clear(&key).await.map_err(other)?;
        println!("removed {n} snapshots");
        return Ok(());
    }
    for s in store.list(&key, limit).await.map_err(other)? {
        println!("{:>4}  {:<10} {}", s.id, s.source.as_str(), age(s.created_at));
    }
    Ok(())
}

async fn snapshot(id: i64, diff: bool, conn: Connection) -> io::Result<()> {
    let store = SnapshotStore::new(conn);
    let snap = store
        .get(id)
        .await
        .map_err(other)?
        .ok_or_else(|| other(format!("snapshot {id} not found")))?;
    if !diff {
        print!("{}", snap.content);
        return Ok(());
    }

    let previous = store.get_previous(id).await.map_err(other)?;
    let before = previous.as_ref().map(|p| p.content.as_str()).unwrap_or("");
    let lines = compute_line_diff(before, &snap.content);
    let s = stats(&lines);
    match previous {
        Some(p) => println!("snapshot {} -> {id}: +{} -{}", p.id, s.added, s.removed),
        None => println!("snapshot {id} (first): +{}", s.added),
    }
    let mut out = io::stdout().lock();
    for l in &lines {
        let prefix = match l.kind {
            DiffKind::Added => '+',
            DiffKind::Removed => '-',
            DiffKind::Unchanged => ' ',
        };
        writeln!(out, "{prefix} {}", l.content)?;
    }
    Ok(())
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}

/// Coarse "how long ago" for a Unix timestamp.
fn age(ts: i64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(ts);
    let secs = (now - ts).max(0);
    match secs {
        0..60 => format!("{secs}s ago"),
        60..3600 => format!("{}m ago", secs / 60),
        3600..86400 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86400),
    }
}
