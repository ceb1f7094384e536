// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Inline keyboard builders.

use ttygram_session::{Project, SessionInfo};

use crate::chat::{Button, KeyboardLayout};

/// Paginated project selection keyboard: one project per row, plus
/// navigation buttons when more pages exist.
pub fn build_project_keyboard(
    projects: &[Project],
    page: usize,
    page_size: usize,
) -> KeyboardLayout {
    if projects.is_empty() {
        return Vec::new();
    }

    let start = page * page_size;
    let end = (start + page_size).min(projects.len());
    let mut rows: KeyboardLayout = projects
        .get(start..end)
        .unwrap_or_default()
        .iter()
        .map(|p| {
            vec![Button::new(
                p.name.clone(),
                format!("project:{}", p.path.display()),
            )]
        })
        .collect();

    let mut nav = Vec::new();
    if page > 0 {
        nav.push(Button::new("< Prev", format!("page:{}", page - 1)));
    }
    if end < projects.len() {
        nav.push(Button::new("Next >", format!("page:{}", page + 1)));
    }
    if !nav.is_empty() {
        rows.push(nav);
    }
    rows
}

/// Session listing keyboard: a switch button and a kill button per
/// session; the active session is marked with an asterisk.
pub fn build_sessions_keyboard(
    sessions: &[SessionInfo],
    active_id: Option<u32>,
) -> KeyboardLayout {
    sessions
        .iter()
        .map(|s| {
            let marker = if Some(s.session_id) == active_id { " *" } else { "" };
            vec![
                Button::new(
                    format!("#{} {}{}", s.session_id, s.project_name, marker),
                    format!("switch:{}", s.session_id),
                ),
                Button::new("Kill", format!("kill:{}", s.session_id)),
            ]
        })
        .collect()
}

/// Truncate a menu option label so it fits on a button.
fn button_label(index: usize, option: &str) -> String {
    const MAX_LABEL: usize = 32;
    let mut label = option.to_string();
    if label.chars().count() > MAX_LABEL {
        label = label.chars().take(MAX_LABEL - 1).collect();
        label.push('…');
    }
    format!("{}. {label}", index + 1)
}

/// Tool approval keyboard: one button per menu option (navigating the
/// TUI cursor to it and confirming), plus an Allow/Deny row that maps to
/// Enter/Escape.
pub fn build_tool_approval_keyboard(
    session_id: u32,
    options: &[String],
    selected: usize,
) -> KeyboardLayout {
    let mut rows: KeyboardLayout = options
        .iter()
        .enumerate()
        .map(|(i, option)| {
            vec![Button::new(
                button_label(i, option),
                format!("tool:pick:{selected}:{i}:{session_id}"),
            )]
        })
        .collect();
    rows.push(vec![
        Button::new("Allow", format!("tool:yes:{session_id}")),
        Button::new("Deny", format!("tool:no:{session_id}")),
    ]);
    rows
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn projects(n: usize) -> Vec<Project> {
        (0..n)
            .map(|i| Project {
                name: format!("proj{i:02}"),
                path: PathBuf::from(format!("/srv/proj{i:02}")),
            })
            .collect()
    }

    #[test]
    fn project_keyboard_paginates() {
        let all = projects(10);
        let first = build_project_keyboard(&all, 0, 8);
        // 8 projects + nav row
        assert_eq!(first.len(), 9);
        assert_eq!(first[8].len(), 1);
        assert_eq!(first[8][0].text, "Next >");
        assert_eq!(first[0][0].data, "project:/srv/proj00");

        let second = build_project_keyboard(&all, 1, 8);
        assert_eq!(second.len(), 3);
        assert_eq!(second[2][0].text, "< Prev");
    }

    #[test]
    fn empty_projects_give_empty_keyboard() {
        assert!(build_project_keyboard(&[], 0, 8).is_empty());
    }

    #[test]
    fn sessions_keyboard_marks_active() {
        let sessions = vec![
            SessionInfo {
                session_id: 1,
                project_name: "alpha".into(),
                project_path: PathBuf::from("/srv/alpha"),
            },
            SessionInfo {
                session_id: 2,
                project_name: "beta".into(),
                project_path: PathBuf::from("/srv/beta"),
            },
        ];
        let rows = build_sessions_keyboard(&sessions, Some(2));
        assert_eq!(rows[0][0].text, "#1 alpha");
        assert_eq!(rows[1][0].text, "#2 beta *");
        assert_eq!(rows[1][1].data, "kill:2");
    }

    #[test]
    fn tool_keyboard_has_pick_and_confirm_rows() {
        let options = vec![
            "Yes".to_string(),
            "Yes, allow all edits during this session (shift+tab)".to_string(),
            "No".to_string(),
        ];
        let rows = build_tool_approval_keyboard(7, &options, 0);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0][0].data, "tool:pick:0:0:7");
        assert_eq!(rows[2][0].data, "tool:pick:0:2:7");
        // Long labels are truncated with an ellipsis
        assert!(rows[1][0].text.ends_with('…'));
        assert_eq!(rows[3][0].data, "tool:yes:7");
        assert_eq!(rows[3][1].data, "tool:no:7");
    }
}
