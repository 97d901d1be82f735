//! User configuration.
//!
//! Read once at startup from `$XDG_CONFIG_HOME/komma/config.toml` (falling back
//! to `~/.config/komma/config.toml`). Every key has a default, and a missing or
//! malformed file is a soft failure: komma logs it and starts with defaults.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use komma_core::tiers::TierTable;
use komma_core::transport::{MailboxTransport, ProcessTransport, Transport, DEFAULT_POLL_INTERVAL};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KommaConfig {
    pub theme: String,
    pub db_path: PathBuf,
    pub transport: TransportConfig,
    pub tiers: TierTable,
}

impl Default for KommaConfig {
    fn default() -> Self {
        Self {
            theme: "catppuccin-mocha".to_owned(),
            db_path: PathBuf::from(".komma/komma.db"),
            transport: TransportConfig::default(),
            tiers: TierTable::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Spawn the assistant directly.
    #[default]
    Process,
    /// Hand requests to an external watcher through files.
    Mailbox,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub mode: TransportMode,
    pub process: ProcessConfig,
    pub mailbox: MailboxConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub program: String,
    /// Placed before the tier flags.
    pub args: Vec<String>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_owned(),
            args: vec!["-p".to_owned(), "--permission-mode".to_owned(), "acceptEdits".to_owned()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    pub dir: PathBuf,
    pub poll_interval_ms: u64,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl TransportConfig {
    /// Builds the transport chosen for this run.
    pub fn build(&self) -> Arc<dyn Transport> {
        match self.mode {
            TransportMode::Process => {
                info!(program = %self.process.program, "using process transport");
                Arc::new(ProcessTransport::new(self.process.program.clone(), self.process.args.clone()))
            }
            TransportMode::Mailbox => {
                info!(dir = %self.mailbox.dir.display(), "using mailbox transport");
                let interval = Duration::from_millis(self.mailbox.poll_interval_ms.max(10));
                Arc::new(MailboxTransport::new(&self.mailbox.dir, interval))
            }
        }
    }
}

/// Returns the path to the komma config file.
///
/// Prefers `$XDG_CONFIG_HOME/komma/config.toml`; falls back to
/// `~/.config/komma/config.toml` when the env var is absent.
pub fn config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        })
        .unwrap_or_else(|| PathBuf::from(".config"));
    base.join("komma").join("config.toml")
}

/// Loads the config from [`config_path`]. Never fails.
pub fn load() -> KommaConfig {
    load_from(&config_path())
}

/// Loads the config from `path`, falling back to defaults when the file is
/// missing or cannot be parsed.
pub fn load_from(path: &Path) -> KommaConfig {
    let raw = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return KommaConfig::default(),
    };
    match toml::from_str(&raw) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config parse error, using defaults");
            KommaConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn full_file_overrides_defaults() {
        let config: KommaConfig = toml::from_str(
            r#"
            theme = "dark"
            db_path = "/tmp/k.db"

            [transport]
            mode = "mailbox"

            [transport.mailbox]
            dir = "/var/komma"
            poll_interval_ms = 250

            [tiers.fast]
            model = "small"
            max_turns = 2
            allowed_tools = ["Edit"]
            "#,
        )
        .unwrap();

        assert_eq!(config.theme, "dark");
        assert_eq!(config.db_path, PathBuf::from("/tmp/k.db"));
        assert_eq!(config.transport.mode, TransportMode::Mailbox);
        assert_eq!(config.transport.mailbox.dir, PathBuf::from("/var/komma"));
        assert_eq!(config.transport.mailbox.poll_interval_ms, 250);
        assert_eq!(config.transport.process, ProcessConfig::default());
        assert_eq!(config.tiers.fast.model, "small");
        assert_eq!(config.tiers.default.model, "sonnet");
    }

    #[test]
    fn mailbox_defaults_to_core_poll_interval() {
        let config: KommaConfig = toml::from_str("[transport]\nmode = \"mailbox\"\n").unwrap();
        assert_eq!(
            Duration::from_millis(config.transport.mailbox.poll_interval_ms),
            DEFAULT_POLL_INTERVAL
        );
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(load_from(&dir.path().join("none.toml")), KommaConfig::default());
    }

    #[test]
    fn malformed_file_gives_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "theme = [not toml").unwrap();
        assert_eq!(load_from(file.path()), KommaConfig::default());
    }

    #[tokio::test]
    async fn builds_selected_transport() {
        let mut config = TransportConfig::default();
        assert_eq!(config.build().name(), "process");
        config.mode = TransportMode::Mailbox;
        assert_eq!(config.build().name(), "mailbox");
    }
}
