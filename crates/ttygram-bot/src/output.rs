// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The session output loop.
//!
//! One supervisor polls every session's PTY on a fixed interval, feeds new
//! bytes into that session's emulator, classifies the screen, and drives
//! the session's pipeline runner.  Quiet ticks flush any content a
//! throttled edit left pending.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use ttygram_session::SessionManager;
use ttygram_term::classify_screen_state;

use crate::chat::{ChatApi, ChatError};
use crate::pipeline::{new_pipeline_state, PipelineRegistry};
use crate::runner::PipelineRunner;

/// Terminal geometry shared by the PTY and the reading emulator.
#[derive(Debug, Clone, Copy)]
pub struct TerminalGeometry {
    pub rows: u16,
    pub cols: u16,
    pub scrollback: usize,
}

pub struct OutputSupervisor {
    chat: Arc<dyn ChatApi>,
    sessions: Arc<SessionManager>,
    registry: Arc<PipelineRegistry>,
    poll_interval: Duration,
    edit_rate_limit: u32,
    geometry: TerminalGeometry,
}

impl OutputSupervisor {
    pub fn new(
        chat: Arc<dyn ChatApi>,
        sessions: Arc<SessionManager>,
        registry: Arc<PipelineRegistry>,
        poll_interval: Duration,
        edit_rate_limit: u32,
        geometry: TerminalGeometry,
    ) -> Self {
        Self {
            chat,
            sessions,
            registry,
            poll_interval,
            edit_rate_limit,
            geometry,
        }
    }

    /// Run forever, one tick per poll interval.
    pub async fn run(self) {
        loop {
            tokio::time::sleep(self.poll_interval).await;
            self.tick().await;
        }
    }

    /// One poll cycle over a snapshot of the session map.
    pub async fn tick(&self) {
        let keys = self.sessions.snapshot();
        let mut states = self.registry.states.lock().await;

        // Drop pipeline state for sessions that no longer exist; this also
        // cancels their typing tasks.
        states.retain(|key, _| keys.contains(key));

        for (user_id, session_id) in keys {
            let state = states.entry((user_id, session_id)).or_insert_with(|| {
                new_pipeline_state(
                    Arc::clone(&self.chat),
                    user_id,
                    self.edit_rate_limit,
                    self.geometry.rows,
                    self.geometry.cols,
                    self.geometry.scrollback,
                )
            });

            let raw = self.sessions.read_available(user_id, session_id);
            if raw.is_empty() {
                // No new output; push out any content a throttled edit
                // left behind.
                match state.streaming.flush_pending().await {
                    Ok(()) => {}
                    Err(ChatError::Forbidden) => {
                        warn!(user_id, session_id, "user blocked the bot; killing session");
                        if let Err(e) = self.sessions.kill_session(user_id, session_id).await {
                            warn!("kill after Forbidden failed: {e}");
                        }
                    }
                    Err(e) => warn!("pending flush failed: {e}"),
                }
                continue;
            }

            state.emulator.feed(&raw);
            let display = state.emulator.get_display();
            let event = classify_screen_state(&display);

            let mut runner = PipelineRunner::new(
                state,
                user_id,
                session_id,
                Arc::clone(&self.chat),
                Arc::clone(&self.sessions),
            );
            runner.process(event).await;
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::mock::MockChat;
    use ttygram_session::{FileStore, HistoryLog, SessionManagerConfig};

    fn supervisor(dir: &std::path::Path, chat: Arc<MockChat>) -> (OutputSupervisor, Arc<SessionManager>) {
        let sessions = Arc::new(SessionManager::new(
            SessionManagerConfig {
                command: "/bin/sh".to_string(),
                args: vec![
                    "-c".to_string(),
                    // Paint a thinking indicator, then exit-like idle quiet.
                    "printf '❯ What is 2+2?\\r\\n\\r\\n✶ Pondering…\\r\\n'; sleep 30".to_string(),
                ],
                env: HashMap::new(),
                rows: 40,
                cols: 120,
                max_per_user: 3,
            },
            FileStore::new(dir.join("uploads")),
            HistoryLog::new(dir.join("history")),
        ));
        let registry = Arc::new(PipelineRegistry::new());
        let supervisor = OutputSupervisor::new(
            chat,
            Arc::clone(&sessions),
            registry,
            Duration::from_millis(50),
            1000,
            TerminalGeometry {
                rows: 40,
                cols: 120,
                scrollback: 1000,
            },
        );
        (supervisor, sessions)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tick_drives_the_pipeline_from_pty_output() {
        let dir = tempfile::tempdir().unwrap();
        let chat = Arc::new(MockChat::new());
        let (supervisor, sessions) = supervisor(dir.path(), chat.clone());
        sessions.create_session(7, "proj", dir.path()).unwrap();

        // Give the shell time to paint, then poll until classified.
        let mut sent = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            supervisor.tick().await;
            if !chat.messages().is_empty() {
                sent = true;
                break;
            }
        }
        assert!(sent, "expected the thinking placeholder to be sent");
        assert_eq!(chat.messages()[0].text, "<i>Thinking...</i>");

        sessions.kill_session(7, 1).await.unwrap();
        // Next tick drops the session's pipeline state.
        supervisor.tick().await;
        assert!(supervisor.registry.states.lock().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tick_without_sessions_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let chat = Arc::new(MockChat::new());
        let (supervisor, _sessions) = supervisor(dir.path(), chat.clone());
        supervisor.tick().await;
        assert!(chat.messages().is_empty());
    }
}
