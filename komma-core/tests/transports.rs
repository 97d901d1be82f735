//! Both transports against real files and processes.

use std::path::Path;
use std::time::Duration;

use komma_core::error::TransportError;
use komma_core::tiers::TierTable;
use komma_core::transport::{
    MailboxPaths, MailboxTransport, ProcessTransport, TaskHandle, Transport, TransportEvent,
    TransportRequest,
};
use komma_core::types::{ChatRole, HistoryTurn, Tier};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn edit_request(id: &str, target: &Path, prompt: &str) -> TransportRequest {
    TransportRequest::Edit {
        id: id.to_owned(),
        target: target.to_owned(),
        prompt: prompt.to_owned(),
        profile: TierTable::default().profile(Tier::Fast).clone(),
    }
}

async fn next(handle: &mut TaskHandle) -> Option<TransportEvent> {
    timeout(WAIT, handle.events.recv()).await.expect("event within timeout")
}

fn mailbox(dir: &Path) -> MailboxTransport {
    MailboxTransport::new(dir, Duration::from_millis(10))
}

/// Waits until the request has been delivered, i.e. the pending status (the
/// last file written) is on disk in full.
async fn delivered(paths: &MailboxPaths) {
    timeout(WAIT, async {
        loop {
            let pending = std::fs::read_to_string(&paths.status)
                .ok()
                .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
                .is_some_and(|v| v["status"] == "pending");
            if pending {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("request delivered within timeout");
}

#[tokio::test]
async fn mailbox_writes_request_and_clears_stream() {
    let dir = tempfile::TempDir::new().unwrap();
    let paths = MailboxPaths::edit(dir.path());
    std::fs::write(&paths.stream, "residue from last task").unwrap();

    let target = dir.path().join("doc.md");
    let _handle = mailbox(dir.path()).send(edit_request("req-1", &target, "do it")).unwrap();
    delivered(&paths).await;

    assert_eq!(std::fs::read_to_string(&paths.stream).unwrap(), "");
    let request: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&paths.request).unwrap()).unwrap();
    assert_eq!(request["id"], "req-1");
    assert_eq!(request["filePath"], target.to_string_lossy().as_ref());
    assert_eq!(request["prompt"], "do it");
    assert_eq!(request["status"], "pending");
    assert!(request["timestamp"].as_u64().unwrap() > 0);

    let status: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&paths.status).unwrap()).unwrap();
    assert_eq!(status, serde_json::json!({"id": "req-1", "status": "pending"}));
}

#[tokio::test]
async fn mailbox_error_fires_once_and_stops() {
    let dir = tempfile::TempDir::new().unwrap();
    let paths = MailboxPaths::edit(dir.path());
    let mut handle = mailbox(dir.path())
        .send(edit_request("req-1", &dir.path().join("doc.md"), "p"))
        .unwrap();
    delivered(&paths).await;

    std::fs::write(&paths.stream, "working").unwrap();
    assert_eq!(next(&mut handle).await, Some(TransportEvent::Data("working".into())));

    std::fs::write(&paths.status, r#"{"id":"req-1","status":"error","message":"boom"}"#).unwrap();
    assert_eq!(
        next(&mut handle).await,
        Some(TransportEvent::Error { message: "boom".into() })
    );
    // Poller exited and dropped its sender.
    assert_eq!(next(&mut handle).await, None);
}

#[tokio::test]
async fn mailbox_status_without_id_is_accepted() {
    let dir = tempfile::TempDir::new().unwrap();
    let paths = MailboxPaths::edit(dir.path());
    let mut handle = mailbox(dir.path())
        .send(edit_request("req-1", &dir.path().join("doc.md"), "p"))
        .unwrap();
    delivered(&paths).await;

    std::fs::write(&paths.status, r#"{"status":"error","message":"boom"}"#).unwrap();
    assert_eq!(
        next(&mut handle).await,
        Some(TransportEvent::Error { message: "boom".into() })
    );
    assert_eq!(next(&mut handle).await, None);
}

#[tokio::test]
async fn mailbox_relays_whole_stream_and_completes() {
    let dir = tempfile::TempDir::new().unwrap();
    let paths = MailboxPaths::edit(dir.path());
    let mut handle = mailbox(dir.path())
        .send(edit_request("req-1", &dir.path().join("doc.md"), "p"))
        .unwrap();
    delivered(&paths).await;

    std::fs::write(&paths.stream, "Hel").unwrap();
    assert_eq!(next(&mut handle).await, Some(TransportEvent::Data("Hel".into())));
    std::fs::write(&paths.stream, "Hello").unwrap();
    assert_eq!(next(&mut handle).await, Some(TransportEvent::Data("Hello".into())));

    // A status for some other request is not ours.
    std::fs::write(&paths.status, r#"{"id":"other","status":"completed"}"#).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handle.events.try_recv().is_err());

    std::fs::write(&paths.status, r#"{"id":"req-1","status":"complete","message":"ok"}"#).unwrap();
    assert_eq!(
        next(&mut handle).await,
        Some(TransportEvent::Complete { output: "Hello".into(), message: Some("ok".into()) })
    );
    assert_eq!(next(&mut handle).await, None);
}

#[tokio::test]
async fn mailbox_missing_files_are_idle_and_kill_stops_polling() {
    let dir = tempfile::TempDir::new().unwrap();
    let paths = MailboxPaths::edit(dir.path());
    let mut handle = mailbox(dir.path())
        .send(edit_request("req-1", &dir.path().join("doc.md"), "p"))
        .unwrap();
    delivered(&paths).await;

    std::fs::remove_file(&paths.stream).unwrap();
    std::fs::remove_file(&paths.status).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handle.events.try_recv().is_err());

    let TaskHandle { mut events, killer } = handle;
    killer.kill();
    assert_eq!(timeout(WAIT, events.recv()).await.unwrap(), None);
}

#[tokio::test]
async fn mailbox_error_without_message_uses_fallback() {
    let dir = tempfile::TempDir::new().unwrap();
    let paths = MailboxPaths::edit(dir.path());
    let mut handle = mailbox(dir.path())
        .send(edit_request("req-1", &dir.path().join("doc.md"), "p"))
        .unwrap();
    delivered(&paths).await;

    std::fs::write(&paths.status, r#"{"id":"req-1","status":"error"}"#).unwrap();
    assert_eq!(
        next(&mut handle).await,
        Some(TransportEvent::Error { message: "Failed to apply changes".into() })
    );
}

#[tokio::test]
async fn mailbox_chat_request_uses_chat_files() {
    let dir = tempfile::TempDir::new().unwrap();
    let chat = MailboxPaths::chat(dir.path());
    let request = TransportRequest::Chat {
        id: "chat-1".into(),
        session_id: 7,
        document_path: dir.path().join("doc.md"),
        message: "why?".into(),
        context_selection: Some("sel".into()),
        history: vec![HistoryTurn { role: ChatRole::User, content: "hi".into() }],
        prompt: "full prompt".into(),
        profile: TierTable::default().default.for_chat(),
    };
    let _handle = mailbox(dir.path()).send(request).unwrap();
    delivered(&chat).await;

    let body: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&chat.request).unwrap()).unwrap();
    assert_eq!(body["sessionId"], 7);
    assert_eq!(body["message"], "why?");
    assert_eq!(body["contextSelection"], "sel");
    assert_eq!(body["history"], serde_json::json!([{"role": "user", "content": "hi"}]));
    assert!(!MailboxPaths::edit(dir.path()).request.exists());
}

#[tokio::test]
async fn mailbox_unwritable_dir_fails_the_task() {
    let dir = tempfile::TempDir::new().unwrap();
    let missing = dir.path().join("no-such-dir");
    let mut handle = mailbox(&missing)
        .send(edit_request("req-1", &dir.path().join("doc.md"), "p"))
        .unwrap();

    match next(&mut handle).await {
        Some(TransportEvent::Error { message }) => {
            assert!(message.contains("no-such-dir"), "{message}");
        }
        other => panic!("expected a write error, got {other:?}"),
    }
    assert_eq!(next(&mut handle).await, None);
}

// `sh -c SCRIPT sh …` ignores the profile flags appended after it.
#[cfg(unix)]
fn shell(script: &str) -> ProcessTransport {
    ProcessTransport::new("sh", vec!["-c".into(), script.into(), "sh".into()])
}

#[cfg(unix)]
#[tokio::test]
async fn process_streams_cumulative_output_and_completes() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut handle = shell("cat")
        .send(edit_request("req-1", &dir.path().join("doc.md"), "hello assistant"))
        .unwrap();

    let mut last_len = 0;
    loop {
        match next(&mut handle).await.expect("terminal event") {
            TransportEvent::Data(text) => {
                assert!(text.len() > last_len);
                assert!("hello assistant".starts_with(&text));
                last_len = text.len();
            }
            TransportEvent::Complete { output, message } => {
                assert_eq!(output, "hello assistant");
                assert_eq!(message, None);
                break;
            }
            TransportEvent::Error { message } => panic!("unexpected error: {message}"),
        }
    }
}

#[cfg(unix)]
#[tokio::test]
async fn process_nonzero_exit_reports_stderr() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut handle = shell("echo oops >&2; exit 3")
        .send(edit_request("req-1", &dir.path().join("doc.md"), "p"))
        .unwrap();
    assert_eq!(next(&mut handle).await, Some(TransportEvent::Error { message: "oops".into() }));
}

#[cfg(unix)]
#[tokio::test]
async fn process_spawn_failure_is_synchronous() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = ProcessTransport::new("/nonexistent/komma-assistant", vec![])
        .send(edit_request("req-1", &dir.path().join("doc.md"), "p"))
        .unwrap_err();
    assert!(matches!(err, TransportError::Spawn { .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn process_kill_delivers_nothing() {
    let dir = tempfile::TempDir::new().unwrap();
    let TaskHandle { mut events, killer } = shell("sleep 30")
        .send(edit_request("req-1", &dir.path().join("doc.md"), "p"))
        .unwrap();
    killer.kill();
    assert_eq!(timeout(WAIT, events.recv()).await.unwrap(), None);
}
