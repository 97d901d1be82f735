//! komma: review-comment driven document editing with an AI assistant.
//!
//! `komma review <file>` opens the review screen. The other subcommands are
//! one-shot and live in `cli.rs`.
//!
//! # Review startup sequence
//!
//! 1. Config, database and session are set up before the terminal is
//!    touched, so their failures print as plain errors.
//! 2. `install_panic_hook()` first, so it is the innermost hook.
//! 3. `register_sigterm()`; the flag is polled by the loop heartbeat.
//! 4. `init_tui()`, then the event task and the task-event forwarder.
//!
//! The loop exits only via `break`, so `restore_tui()` is always reached.

mod app;
mod cli;
mod config;
mod event;
mod highlight;
mod logging;
mod theme;
mod tui;
mod ui;

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use clap::Parser as _;
use komma_core::db;
use komma_core::diff::stats;
use komma_core::error::ReviewError;
use komma_core::review::path_key;
use komma_core::session::{EditingSession, SessionUpdate};
use komma_core::types::{TaskKind, Tier};
use tokio_rusqlite::Connection;
use tracing::{error, info};

use crate::app::{AppState, StatusKind};
use crate::cli::{Cli, Command};
use crate::config::KommaConfig;
use crate::event::AppEvent;
use crate::theme::Theme;
use crate::ui::keybindings::{handle_key, handle_mouse, KeyAction};

const LOG_PATH: &str = ".komma/komma.log";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("komma: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> std::io::Result<()> {
    match &cli.command {
        Command::Review { .. } => logging::init_file(Path::new(LOG_PATH))?,
        _ => logging::init_stderr(),
    }
    let config = config::load();
    let conn = open_database(&config).await?;

    match cli.command {
        Command::Review { file, tier } => review(&file, tier, conn, &config).await,
        command => cli::run(command, conn, &config).await,
    }
}

async fn open_database(config: &KommaConfig) -> std::io::Result<Connection> {
    if let Some(dir) = config.db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    db::open_db(&config.db_path.to_string_lossy()).await.map_err(cli::other)
}

async fn review(file: &Path, tier: Tier, conn: Connection, config: &KommaConfig) -> std::io::Result<()> {
    let document: PathBuf = cli::document_path(file)?;
    let theme = Theme::from_name(&config.theme);
    let _ = tokio::task::spawn_blocking(highlight::warm_up);

    let (mut session, task_rx) =
        EditingSession::new(conn.clone(), config.transport.build(), config.tiers.clone());
    let mut state = AppState::new(document, tier);
    refresh_pending(&conn, &mut state).await;
    info!(path = %state.document.display(), transport = session.dispatcher().transport_name(), "review opened");

    tui::install_panic_hook();
    let term_flag = tui::register_sigterm()?;
    let mut terminal = tui::init_tui()?;

    let handler = event::EventHandler::new();
    event::spawn_event_task(handler.tx.clone());
    event::spawn_task_forwarder(task_rx, handler.tx.clone());
    let mut rx = handler.rx;

    let mut draw_error = None;
    'event_loop: loop {
        tokio::select! {
            // A quiet terminal would otherwise block in rx.recv() and never
            // see the SIGTERM flag.
            _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {
                if term_flag.load(Ordering::Relaxed) {
                    break 'event_loop;
                }
            }
            maybe_event = rx.recv() => {
                match maybe_event {
                    Some(AppEvent::Render) => {
                        // The only draw() call in the program.
                        if let Err(e) = terminal.draw(|frame| ui::render(frame, &mut state, &theme)) {
                            draw_error = Some(e);
                            break 'event_loop;
                        }
                    }
                    Some(AppEvent::Key(key)) => {
                        let action = handle_key(key, &mut state);
                        if perform(action, &mut session, &mut state, &conn).await {
                            break 'event_loop;
                        }
                    }
                    Some(AppEvent::Mouse(mouse)) => handle_mouse(mouse, &mut state),
                    Some(AppEvent::Tick) => state.tick = state.tick.wrapping_add(1),
                    Some(AppEvent::Task(ev)) => {
                        if let Some(update) = session.handle(ev).await {
                            apply_update(update, &session, &mut state, &conn, &theme).await;
                        }
                    }
                    // Next Render picks up the new frame.area().
                    Some(AppEvent::Resize(_, _)) => {}
                    None => break 'event_loop,
                }
                if term_flag.load(Ordering::Relaxed) {
                    break 'event_loop;
                }
            }
        }
    }

    if session.dispatcher().is_busy() {
        session.cancel().await;
    }
    tui::restore_tui()?;
    match draw_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Carries out a key action that needs the session. Returns `true` to quit.
async fn perform(
    action: KeyAction,
    session: &mut EditingSession,
    state: &mut AppState,
    conn: &Connection,
) -> bool {
    match action {
        KeyAction::Continue => {}
        KeyAction::Quit => return true,
        KeyAction::Submit => {
            let document = state.document.clone();
            match session.start_edit(&document, state.tier).await {
                Ok(Some(_)) => {
                    state.begin_task(TaskKind::Edit);
                    state.set_status(StatusKind::Info, format!("sent {} comment(s)", state.pending_comments));
                }
                Ok(None) => state.set_status(StatusKind::Info, "no pending comments"),
                Err(e) => {
                    error!(error = %e, "edit dispatch failed");
                    state.set_status(StatusKind::Error, e.to_string());
                }
            }
        }
        KeyAction::Cancel => {
            if session.cancel().await {
                state.busy = None;
                state.set_status(StatusKind::Info, "cancelled; comments stay pending");
            }
        }
        KeyAction::Approve => match session.approve().await {
            Ok(_) => {
                state.clear_review();
                state.set_status(StatusKind::Success, "approved");
                refresh_pending(conn, state).await;
            }
            Err(e) => review_failed(state, e),
        },
        KeyAction::Reject => match session.reject().await {
            Ok(_) => {
                state.clear_review();
                state.set_status(StatusKind::Success, "rejected; previous content restored");
                refresh_pending(conn, state).await;
            }
            Err(e) => review_failed(state, e),
        },
    }
    false
}

fn review_failed(state: &mut AppState, e: ReviewError) {
    match e {
        ReviewError::NothingPending => state.set_status(StatusKind::Info, "nothing to review"),
        e => {
            error!(error = %e, "review action failed");
            state.set_status(StatusKind::Error, e.to_string());
        }
    }
}

async fn apply_update(
    update: SessionUpdate,
    session: &EditingSession,
    state: &mut AppState,
    conn: &Connection,
    theme: &Theme,
) {
    match update {
        SessionUpdate::Stream { text, .. } => state.set_output(text),
        SessionUpdate::EditApplied { summary, reviewable, .. } => {
            state.busy = None;
            if reviewable {
                if let Some(review) = session.pending_review() {
                    let lines = review.diff();
                    let counts = stats(&lines);
                    state.set_review(highlight::highlight_diff(&lines, &review.document, theme), counts);
                }
            }
            state.set_status(StatusKind::Success, summary);
            refresh_pending(conn, state).await;
        }
        SessionUpdate::ChatReply { reply, .. } => {
            state.busy = None;
            state.set_output(reply);
        }
        SessionUpdate::Failed { message, .. } => {
            state.busy = None;
            state.set_status(StatusKind::Error, message);
            refresh_pending(conn, state).await;
        }
    }
}

async fn refresh_pending(conn: &Connection, state: &mut AppState) {
    match db::list_pending_comments(conn, &path_key(&state.document)).await {
        Ok(comments) => state.pending_comments = comments.len(),
        Err(e) => error!(error = %e, "could not count pending comments"),
    }
}
