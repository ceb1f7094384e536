// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
/// End-to-end gateway test: a scripted fake CLI paints a thinking
/// indicator, then a response and an idle prompt, through a real PTY; the
/// supervisor drives the pipeline against the mock chat backend.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ttygram_bot::{MockChat, OutputSupervisor, PipelineRegistry, TerminalGeometry};
use ttygram_session::{FileStore, HistoryLog, SessionManager, SessionManagerConfig};

const FAKE_CLI: &str = r#"
printf '❯ compute\r\n\r\n✶ Thinking…\r\n'
sleep 1.5
printf '\033[2J\033[H'
printf '❯ compute\r\n\r\n⏺ The answer is 4.\r\n\r\n'
printf '────────────────────────────────────────\r\n❯\r\n────────────────────────────────────────\r\n'
sleep 30
"#;

#[tokio::test(flavor = "multi_thread")]
async fn scripted_session_streams_into_one_edited_message() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fake-cli.sh");
    std::fs::write(&script, FAKE_CLI).unwrap();

    let sessions = Arc::new(SessionManager::new(
        SessionManagerConfig {
            command: "/bin/sh".to_string(),
            args: vec![script.display().to_string()],
            env: HashMap::new(),
            rows: 40,
            cols: 120,
            max_per_user: 3,
        },
        FileStore::new(dir.path().join("uploads")),
        HistoryLog::new(dir.path().join("history")),
    ));
    let registry = Arc::new(PipelineRegistry::new());
    let chat = Arc::new(MockChat::new());
    let supervisor = OutputSupervisor::new(
        chat.clone(),
        Arc::clone(&sessions),
        Arc::clone(&registry),
        Duration::from_millis(50),
        1000,
        TerminalGeometry {
            rows: 40,
            cols: 120,
            scrollback: 1000,
        },
    );

    sessions.create_session(7, "proj", dir.path()).unwrap();

    let mut placeholder_seen = false;
    let mut final_text = String::new();
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(30)).await;
        supervisor.tick().await;
        let messages = chat.messages();
        if let Some(first) = messages.first() {
            if first.text.contains("Thinking") {
                placeholder_seen = true;
            }
            if first.text.contains("The answer is 4.") {
                final_text = first.text.clone();
                break;
            }
        }
    }

    assert!(placeholder_seen, "the thinking placeholder was never sent");
    assert!(
        final_text.contains("The answer is 4."),
        "the response never reached chat: {final_text:?}"
    );
    // The whole exchange happened inside a single edited message.
    assert_eq!(chat.messages().len(), 1);

    // History recorded the session start.
    assert_eq!(sessions.history().recent(7, 10).len(), 1);

    sessions.kill_session(7, 1).await.unwrap();
    assert_eq!(sessions.session_count(), 0);
}
