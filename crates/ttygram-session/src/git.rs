// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Git summary for a project directory: current branch plus an open PR
//! when the `gh` CLI is available.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitInfo {
    pub branch: Option<String>,
    pub pr_url: Option<String>,
    pub pr_title: Option<String>,
    pub pr_state: Option<String>,
}

impl GitInfo {
    /// One-line HTML summary for chat.
    pub fn format_html(&self) -> String {
        let Some(branch) = &self.branch else {
            return "No git info available".to_string();
        };
        let mut parts = vec![format!("Branch: <code>{}</code>", escape(branch))];
        match (&self.pr_url, &self.pr_title) {
            (Some(url), Some(title)) => {
                parts.push(format!(
                    "PR: <a href=\"{}\">{}</a>",
                    escape(url),
                    escape(title)
                ));
            }
            _ => parts.push("No open PR".to_string()),
        }
        parts.join(" | ")
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[derive(Deserialize)]
struct PrView {
    url: Option<String>,
    title: Option<String>,
    state: Option<String>,
}

async fn run_command(program: &str, args: &[&str], cwd: &Path) -> Option<String> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Collect branch and PR info for a project directory.  Every failure mode
/// (not a repo, no git, no gh, no PR) degrades to fields left `None`.
pub async fn get_git_info(project_path: &Path) -> GitInfo {
    let Some(branch) = run_command("git", &["branch", "--show-current"], project_path).await
    else {
        return GitInfo::default();
    };

    let mut info = GitInfo {
        branch: (!branch.is_empty()).then_some(branch),
        ..GitInfo::default()
    };

    if let Some(raw) =
        run_command("gh", &["pr", "view", "--json", "url,title,state"], project_path).await
    {
        if let Ok(pr) = serde_json::from_str::<PrView>(&raw) {
            info.pr_url = pr.url;
            info.pr_title = pr.title;
            info.pr_state = pr.state;
        } else {
            debug!("unparseable gh pr view output");
        }
    }

    info
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
