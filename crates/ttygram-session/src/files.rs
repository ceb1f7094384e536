// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-session upload directories.

use std::path::{Path, PathBuf};

use tracing::warn;

/// Manages the directories that chat file uploads land in before their
/// paths are handed to the CLI.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn session_dir(&self, project_name: &str, session_id: u32) -> PathBuf {
        self.base_dir.join(format!("{project_name}_{session_id}"))
    }

    /// The upload directory for a session, created on first use.
    pub fn upload_dir(&self, project_name: &str, session_id: u32) -> std::io::Result<PathBuf> {
        let dir = self.session_dir(project_name, session_id);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// A collision-free path for `filename` inside the session's upload
    /// directory.  An existing `report.txt` yields `report_1.txt`, then
    /// `report_2.txt`, and so on.
    pub fn upload_path(
        &self,
        project_name: &str,
        session_id: u32,
        filename: &str,
    ) -> std::io::Result<PathBuf> {
        let dir = self.upload_dir(project_name, session_id)?;
        let mut path = dir.join(filename);
        if !path.exists() {
            return Ok(path);
        }
        let (stem, ext) = match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{ext}")),
            _ => (filename.to_string(), String::new()),
        };
        let mut counter = 1;
        while path.exists() {
            path = dir.join(format!("{stem}_{counter}{ext}"));
            counter += 1;
        }
        Ok(path)
    }

    /// Remove a session's upload directory and everything in it.
    pub fn cleanup_session(&self, project_name: &str, session_id: u32) {
        let dir = self.session_dir(project_name, session_id);
        if dir.is_dir() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!(dir = %dir.display(), "failed to clean upload dir: {e}");
            }
        }
    }

    pub fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
