//! Direct subprocess delivery.

use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::{KillSwitch, TaskHandle, Transport, TransportEvent, TransportRequest};
use crate::error::TransportError;
use crate::tiers::TierProfile;

const READ_CHUNK: usize = 8 * 1024;

/// Spawns `program args… <profile args>` per task, writes the prompt to its
/// stdin and streams its stdout.
#[derive(Debug, Clone)]
pub struct ProcessTransport {
    program: String,
    args: Vec<String>,
}

impl ProcessTransport {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }
}

/// Renders a tier profile as assistant command-line flags.
pub(crate) fn profile_args(profile: &TierProfile) -> Vec<String> {
    let mut args = vec!["--model".to_owned(), profile.model.clone()];
    if let Some(turns) = profile.max_turns {
        args.push("--max-turns".to_owned());
        args.push(turns.to_string());
    }
    if !profile.allowed_tools.is_empty() {
        args.push("--allowedTools".to_owned());
        args.push(profile.allowed_tools.join(","));
    }
    args
}

impl Transport for ProcessTransport {
    fn name(&self) -> &'static str {
        "process"
    }

    fn send(&self, request: TransportRequest) -> Result<TaskHandle, TransportError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .args(profile_args(request.profile()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Edits run next to the document so relative paths in the prompt resolve.
        if let TransportRequest::Edit { target, .. } = &request {
            if let Some(dir) = target.parent().filter(|d| !d.as_os_str().is_empty()) {
                cmd.current_dir(dir);
            }
        }

        let child = cmd.spawn().map_err(|source| TransportError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        info!(id = request.id(), pid = child.id(), "assistant process spawned");

        let (tx, events) = mpsc::unbounded_channel();
        let (killer, kill_rx) = KillSwitch::pair();
        tokio::spawn(drive_child(child, request.prompt().to_owned(), tx, kill_rx));

        Ok(TaskHandle { events, killer })
    }
}

async fn drive_child(
    mut child: Child,
    prompt: String,
    tx: mpsc::UnboundedSender<TransportEvent>,
    mut kill_rx: oneshot::Receiver<()>,
) {
    // The prompt is written from its own task so a child that starts printing
    // before it has read all of stdin cannot deadlock us.
    if let Some(mut stdin) = child.stdin.take() {
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                debug!(error = %e, "writing prompt to assistant stdin failed");
            }
            // Dropping stdin closes it: end of prompt.
        });
    }
    let stderr = child.stderr.take().map(|s| tokio::spawn(read_all(s)));

    let mut output = Vec::new();
    if let Some(mut stdout) = child.stdout.take() {
        let mut chunk = vec![0u8; READ_CHUNK];
        let mut sent = 0usize;
        loop {
            tokio::select! {
                _ = &mut kill_rx => {
                    let _ = child.start_kill();
                    debug!("assistant process killed");
                    return;
                }
                read = stdout.read(&mut chunk) => match read {
                    Ok(0) => break,
                    Ok(n) => {
                        output.extend_from_slice(&chunk[..n]);
                        let text = utf8_prefix(&output);
                        if text.len() > sent {
                            sent = text.len();
                            let _ = tx.send(TransportEvent::Data(text.to_owned()));
                        }
                    }
                    Err(e) => {
                        let _ = child.start_kill();
                        let _ = tx.send(TransportEvent::Error { message: e.to_string() });
                        return;
                    }
                },
            }
        }
    }

    let status = tokio::select! {
        _ = &mut kill_rx => {
            let _ = child.start_kill();
            return;
        }
        status = child.wait() => status,
    };

    let stderr = match stderr {
        Some(h) => h.await.unwrap_or_default(),
        None => String::new(),
    };
    let _ = tx.send(outcome(status, &output, &stderr));
}

fn outcome(status: std::io::Result<ExitStatus>, stdout: &[u8], stderr: &str) -> TransportEvent {
    match status {
        Ok(s) if s.success() => TransportEvent::Complete {
            output: String::from_utf8_lossy(stdout).into_owned(),
            message: None,
        },
        Ok(s) => {
            let stderr = stderr.trim();
            let message = if stderr.is_empty() {
                format!("assistant exited with {s}")
            } else {
                stderr.to_owned()
            };
            TransportEvent::Error { message }
        }
        Err(e) => TransportEvent::Error { message: e.to_string() },
    }
}

async fn read_all(mut r: impl AsyncRead + Unpin) -> String {
    let mut buf = Vec::new();
    let _ = r.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

/// The longest prefix of `bytes` that is valid UTF-8. A multi-byte character
/// split across reads is held back until its tail arrives.
fn utf8_prefix(bytes: &[u8]) -> &str {
    match std::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => std::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_args_render_caps_and_tools() {
        let fast = TierProfile {
            model: "haiku".into(),
            max_turns: Some(5),
            allowed_tools: vec!["Read".into(), "Edit".into()],
        };
        assert_eq!(
            profile_args(&fast),
            ["--model", "haiku", "--max-turns", "5", "--allowedTools", "Read,Edit"]
        );

        let max = TierProfile { model: "opus".into(), max_turns: None, allowed_tools: vec![] };
        assert_eq!(profile_args(&max), ["--model", "opus"]);
    }

    #[test]
    fn split_multibyte_char_is_held_back() {
        let bytes = "héllo".as_bytes();
        assert_eq!(utf8_prefix(&bytes[..2]), "h");
        assert_eq!(utf8_prefix(&bytes[..3]), "hé");
    }
}
