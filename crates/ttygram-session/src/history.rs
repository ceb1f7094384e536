// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Append-only JSONL session history.
//!
//! One record is appended when a session starts and another when it ends;
//! readers fold the log so the latest record per session wins.  Chat is
//! the transcript — this log only answers "what ran, when, how did it
//! exit".

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
    Lost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub session_id: u32,
    pub user_id: i64,
    pub project: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub exit_code: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct HistoryLog {
    dir: PathBuf,
}

impl HistoryLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join("sessions.jsonl")
    }

    /// Append one record to the log, creating the directory on first use.
    pub fn record(&self, record: &HistoryRecord) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        let line = serde_json::to_string(record).map_err(std::io::Error::other)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// The most recent sessions of one user, newest first, folded so each
    /// session appears once with its latest known state.
    pub fn recent(&self, user_id: i64, limit: usize) -> Vec<HistoryRecord> {
        let Ok(text) = std::fs::read_to_string(self.log_path()) else {
            return Vec::new();
        };
        let mut folded: Vec<HistoryRecord> = Vec::new();
        for line in text.lines() {
            let record: HistoryRecord = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => {
                    warn!("skipping malformed history line: {e}");
                    continue;
                }
            };
            if record.user_id != user_id {
                continue;
            }
            match folded.iter_mut().find(|r| {
                r.session_id == record.session_id && r.started_at == record.started_at
            }) {
                Some(existing) => *existing = record,
                None => folded.push(record),
            }
        }
        folded.reverse();
        folded.truncate(limit);
        folded
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user: i64, sid: u32, status: SessionStatus) -> HistoryRecord {
        HistoryRecord {
            session_id: sid,
            user_id: user,
            project: "proj".into(),
            started_at: DateTime::parse_from_rfc3339("2026-02-11T22:02:35Z")
                .unwrap()
                .with_timezone(&Utc),
            ended_at: None,
            status,
            exit_code: None,
        }
    }

    #[test]
    fn roundtrip_and_fold() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path().join("history"));

        log.record(&record(7, 1, SessionStatus::Active)).unwrap();
        let mut ended = record(7, 1, SessionStatus::Ended);
        ended.ended_at = Some(Utc::now());
        ended.exit_code = Some(0);
        log.record(&ended).unwrap();
        log.record(&record(8, 1, SessionStatus::Active)).unwrap();

        let recent = log.recent(7, 10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].status, SessionStatus::Ended);
        assert_eq!(recent[0].exit_code, Some(0));
    }

    #[test]
    fn recent_respects_limit_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path().join("history"));
        for sid in 1..=5 {
            let mut r = record(7, sid, SessionStatus::Active);
            r.started_at = Utc::now();
            log.record(&r).unwrap();
        }
        let recent = log.recent(7, 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].session_id, 5);
        assert_eq!(recent[1].session_id, 4);
    }

    #[test]
    fn missing_log_is_empty() {
        let log = HistoryLog::new("/nonexistent/history");
        assert!(log.recent(7, 10).is_empty());
    }
}
