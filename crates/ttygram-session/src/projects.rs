// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Project discovery.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use walkdir::WalkDir;

/// A discovered project with its display name and absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
}

/// Scan a directory tree for projects: directories carrying a `.git` or
/// `.claude` marker, up to `depth` levels below `root`.  Hidden
/// directories are skipped.  Results are sorted by name.
pub fn scan_projects(root: &Path, depth: usize) -> Vec<Project> {
    debug!(root = %root.display(), depth, "scanning projects");
    if !root.is_dir() {
        debug!("root path does not exist");
        return Vec::new();
    }

    let mut projects = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(depth.max(1))
        .into_iter()
        .filter_entry(|e| {
            e.file_type().is_dir()
                && !e
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with('.'))
        })
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if path.join(".git").exists() || path.join(".claude").exists() {
            let name = entry.file_name().to_string_lossy().to_string();
            trace!(name, path = %path.display(), "found project");
            projects.push(Project {
                name,
                path: path.to_path_buf(),
            });
        }
    }

    projects.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(count = projects.len(), "project scan complete");
    projects
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn mkproject(root: &Path, name: &str, marker: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(dir.join(marker)).unwrap();
    }

    #[test]
    fn finds_marked_directories_sorted() {
        let dir = tempfile::tempdir().unwrap();
        mkproject(dir.path(), "zeta", ".git");
        mkproject(dir.path(), "alpha", ".claude");
        std::fs::create_dir_all(dir.path().join("unmarked")).unwrap();

        let projects = scan_projects(dir.path(), 1);
        let names: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn hidden_directories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        mkproject(dir.path(), ".hidden", ".git");
        assert!(scan_projects(dir.path(), 1).is_empty());
    }

    #[test]
    fn depth_two_finds_nested_projects() {
        let dir = tempfile::tempdir().unwrap();
        mkproject(&dir.path().join("group"), "nested", ".git");
        assert!(scan_projects(dir.path(), 1).is_empty());
        let projects = scan_projects(dir.path(), 2);
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "nested");
    }

    #[test]
    fn missing_root_is_empty() {
        assert!(scan_projects(Path::new("/nonexistent/projects"), 1).is_empty());
    }
}
