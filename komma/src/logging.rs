//! Tracing subscriber setup.
//!
//! The review screen owns stderr, so interactive runs log to a file without
//! ANSI colour. One-shot subcommands log to stderr. The filter comes from
//! `KOMMA_LOG` and defaults to info for both komma crates.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "komma=info,komma_core=info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env("KOMMA_LOG").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Appends log records to `path`, creating its directory if needed.
///
/// # Errors
///
/// Returns `Err` if the file cannot be opened or a subscriber is already set.
pub fn init_file(path: &Path) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(io::Error::other)
}

/// Logs to stderr. Only warnings by default so command output stays clean.
pub fn init_stderr() {
    let filter = EnvFilter::try_from_env("KOMMA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}
