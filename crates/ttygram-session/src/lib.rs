// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! CLI session management: the coding-assistant subprocess under a PTY,
//! the per-user session registry, and the thin glue around it (project
//! discovery, git summaries, history log, upload directories).

mod files;
mod git;
mod history;
mod manager;
mod process;
mod projects;

pub use files::FileStore;
pub use git::{get_git_info, GitInfo};
pub use history::{HistoryLog, HistoryRecord, SessionStatus};
pub use manager::{SessionInfo, SessionManager, SessionManagerConfig};
pub use process::{keys, CliProcess, SUBMIT_KEY_DELAY};
pub use projects::{scan_projects, Project};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session limit reached ({0}); kill a session first")]
    LimitReached(u32),
    #[error("session {0} not found")]
    NotFound(u32),
    #[error("no active session; pick a project with /start")]
    NoActiveSession,
    #[error("failed to spawn CLI process: {0}")]
    Spawn(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
