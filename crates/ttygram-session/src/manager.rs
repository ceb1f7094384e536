// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-user session registry.
//!
//! Sessions are numbered per user; each user has at most one *active*
//! session that plain chat messages route to.  The registry hands the
//! output supervisor a snapshot of keys so sessions can be added or
//! removed mid-tick without invalidating the iteration.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::process::{keys, CliProcess, SUBMIT_KEY_DELAY};
use crate::{FileStore, HistoryLog, HistoryRecord, SessionError, SessionStatus};

/// Summary of a session for keyboards and listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: u32,
    pub project_name: String,
    pub project_path: PathBuf,
}

struct CliSession {
    session_id: u32,
    project_name: String,
    project_path: PathBuf,
    process: CliProcess,
    started_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    /// user_id → session_id → session
    sessions: HashMap<i64, BTreeMap<u32, CliSession>>,
    active: HashMap<i64, u32>,
    next_id: HashMap<i64, u32>,
}

/// Spawn parameters shared by every session.
#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub rows: u16,
    pub cols: u16,
    pub max_per_user: u32,
}

pub struct SessionManager {
    config: SessionManagerConfig,
    files: FileStore,
    history: HistoryLog,
    inner: Mutex<Inner>,
}

impl SessionManager {
    pub fn new(config: SessionManagerConfig, files: FileStore, history: HistoryLog) -> Self {
        Self {
            config,
            files,
            history,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    /// Spawn a new session for `user_id` on the given project and make it
    /// the active one.
    pub fn create_session(
        &self,
        user_id: i64,
        project_name: &str,
        project_path: &Path,
    ) -> Result<SessionInfo, SessionError> {
        let session_id = {
            let inner = self.inner.lock().unwrap();
            let count = inner.sessions.get(&user_id).map_or(0, BTreeMap::len);
            if count as u32 >= self.config.max_per_user {
                return Err(SessionError::LimitReached(self.config.max_per_user));
            }
            *inner.next_id.get(&user_id).unwrap_or(&1)
        };

        // Spawn outside the lock; PTY setup can take a moment.
        let process = CliProcess::spawn(
            &self.config.command,
            &self.config.args,
            project_path,
            &self.config.env,
            self.config.rows,
            self.config.cols,
        )?;

        let started_at = Utc::now();
        {
            let mut inner = self.inner.lock().unwrap();
            inner.next_id.insert(user_id, session_id + 1);
            inner.sessions.entry(user_id).or_default().insert(
                session_id,
                CliSession {
                    session_id,
                    project_name: project_name.to_string(),
                    project_path: project_path.to_path_buf(),
                    process,
                    started_at,
                },
            );
            inner.active.insert(user_id, session_id);
        }

        if let Err(e) = self.history.record(&HistoryRecord {
            session_id,
            user_id,
            project: project_name.to_string(),
            started_at,
            ended_at: None,
            status: SessionStatus::Active,
            exit_code: None,
        }) {
            warn!("failed to record session start: {e}");
        }
        info!(user_id, session_id, project = project_name, "session started");

        Ok(SessionInfo {
            session_id,
            project_name: project_name.to_string(),
            project_path: project_path.to_path_buf(),
        })
    }

    pub fn active_session_id(&self, user_id: i64) -> Option<u32> {
        self.inner.lock().unwrap().active.get(&user_id).copied()
    }

    /// Info for the user's active session.
    pub fn active_session(&self, user_id: i64) -> Option<SessionInfo> {
        let inner = self.inner.lock().unwrap();
        let id = *inner.active.get(&user_id)?;
        inner
            .sessions
            .get(&user_id)?
            .get(&id)
            .map(|s| SessionInfo {
                session_id: s.session_id,
                project_name: s.project_name.clone(),
                project_path: s.project_path.clone(),
            })
    }

    pub fn switch_session(&self, user_id: i64, session_id: u32) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner
            .sessions
            .get(&user_id)
            .is_some_and(|m| m.contains_key(&session_id))
        {
            return Err(SessionError::NotFound(session_id));
        }
        inner.active.insert(user_id, session_id);
        Ok(())
    }

    pub fn list_sessions(&self, user_id: i64) -> Vec<SessionInfo> {
        let inner = self.inner.lock().unwrap();
        inner
            .sessions
            .get(&user_id)
            .map(|m| {
                m.values()
                    .map(|s| SessionInfo {
                        session_id: s.session_id,
                        project_name: s.project_name.clone(),
                        project_path: s.project_path.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Kill a session: terminate the subprocess, record history, clean the
    /// upload dir, and promote another session to active if one remains.
    pub async fn kill_session(&self, user_id: i64, session_id: u32) -> Result<(), SessionError> {
        let mut session = {
            let mut inner = self.inner.lock().unwrap();
            let session = inner
                .sessions
                .get_mut(&user_id)
                .and_then(|m| m.remove(&session_id))
                .ok_or(SessionError::NotFound(session_id))?;
            match inner.sessions.get(&user_id).and_then(|m| m.keys().next()) {
                Some(&next) => {
                    inner.active.insert(user_id, next);
                }
                None => {
                    inner.active.remove(&user_id);
                }
            }
            session
        };

        // Terminate outside the lock; reaping can block briefly.
        let session_ref = &mut session;
        tokio::task::block_in_place(|| session_ref.process.terminate());
        let exit_code = session.process.exit_code();

        if let Err(e) = self.history.record(&HistoryRecord {
            session_id,
            user_id,
            project: session.project_name.clone(),
            started_at: session.started_at,
            ended_at: Some(Utc::now()),
            status: SessionStatus::Ended,
            exit_code,
        }) {
            warn!("failed to record session end: {e}");
        }
        self.files.cleanup_session(&session.project_name, session_id);
        info!(user_id, session_id, ?exit_code, "session ended");
        Ok(())
    }

    /// Snapshot of all `(user_id, session_id)` keys for the poll loop.
    pub fn snapshot(&self) -> Vec<(i64, u32)> {
        let inner = self.inner.lock().unwrap();
        inner
            .sessions
            .iter()
            .flat_map(|(&user, m)| m.keys().map(move |&sid| (user, sid)))
            .collect()
    }

    pub fn has_session(&self, user_id: i64, session_id: u32) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .sessions
            .get(&user_id)
            .is_some_and(|m| m.contains_key(&session_id))
    }

    pub fn session_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.sessions.values().map(BTreeMap::len).sum()
    }

    /// Drain available PTY output for one session.
    pub fn read_available(&self, user_id: i64, session_id: u32) -> Vec<u8> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .sessions
            .get_mut(&user_id)
            .and_then(|m| m.get_mut(&session_id))
            .map(|s| s.process.read_available())
            .unwrap_or_default()
    }

    /// Write raw text (or key sequences) into one session's PTY.
    pub fn write_to(
        &self,
        user_id: i64,
        session_id: u32,
        text: &str,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().unwrap();
        let session = inner
            .sessions
            .get_mut(&user_id)
            .and_then(|m| m.get_mut(&session_id))
            .ok_or(SessionError::NotFound(session_id))?;
        session.process.write(text)
    }

    /// Submit a user message to the active session: text, pause, Enter.
    ///
    /// The pause happens with the registry lock released so other sessions
    /// keep flowing.
    pub async fn submit_to_active(&self, user_id: i64, text: &str) -> Result<(), SessionError> {
        let session_id = self
            .active_session_id(user_id)
            .ok_or(SessionError::NoActiveSession)?;
        self.write_to(user_id, session_id, text)?;
        tokio::time::sleep(SUBMIT_KEY_DELAY).await;
        self.write_to(user_id, session_id, keys::ENTER)
    }

    pub fn is_alive(&self, user_id: i64, session_id: u32) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner
            .sessions
            .get_mut(&user_id)
            .and_then(|m| m.get_mut(&session_id))
            .is_some_and(|s| s.process.is_alive())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &Path, max: u32) -> SessionManager {
        SessionManager::new(
            SessionManagerConfig {
                command: "/bin/sh".to_string(),
                args: vec!["-c".to_string(), "sleep 30".to_string()],
                env: HashMap::new(),
                rows: 24,
                cols: 80,
                max_per_user: max,
            },
            FileStore::new(dir.join("uploads")),
            HistoryLog::new(dir.join("history")),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_switch_kill_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 3);

        let a = mgr.create_session(7, "alpha", dir.path()).unwrap();
        let b = mgr.create_session(7, "beta", dir.path()).unwrap();
        assert_eq!(a.session_id, 1);
        assert_eq!(b.session_id, 2);
        // Latest created session becomes active
        assert_eq!(mgr.active_session_id(7), Some(2));

        mgr.switch_session(7, 1).unwrap();
        assert_eq!(mgr.active_session_id(7), Some(1));
        assert_eq!(mgr.list_sessions(7).len(), 2);
        assert_eq!(mgr.snapshot().len(), 2);

        mgr.kill_session(7, 1).await.unwrap();
        // The remaining session is promoted
        assert_eq!(mgr.active_session_id(7), Some(2));
        mgr.kill_session(7, 2).await.unwrap();
        assert_eq!(mgr.active_session_id(7), None);
        assert_eq!(mgr.session_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn per_user_limit_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 1);
        mgr.create_session(7, "alpha", dir.path()).unwrap();
        let err = mgr.create_session(7, "beta", dir.path()).unwrap_err();
        assert!(matches!(err, SessionError::LimitReached(1)));
        // A different user is unaffected
        mgr.create_session(8, "gamma", dir.path()).unwrap();
        mgr.kill_session(7, 1).await.unwrap();
        mgr.kill_session(8, 1).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn session_ids_are_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 3);
        mgr.create_session(7, "alpha", dir.path()).unwrap();
        mgr.kill_session(7, 1).await.unwrap();
        let again = mgr.create_session(7, "alpha", dir.path()).unwrap();
        assert_eq!(again.session_id, 2);
        mgr.kill_session(7, 2).await.unwrap();
    }

    #[test]
    fn switch_to_unknown_session_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 3);
        assert!(matches!(
            mgr.switch_session(7, 9),
            Err(SessionError::NotFound(9))
        ));
    }
}
