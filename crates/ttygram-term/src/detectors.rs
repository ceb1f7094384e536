// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Screen-wide pattern detectors used by the screen classifier, plus the
//! status-bar parsers consumed by chat commands.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{AgentsPayload, TodoCounts, TodoItem, TodoStatus, ToolRequest};
use crate::patterns::{
    AGENTS_LAUNCHED_RE, AGENT_COMPLETE_RE, AGENT_TREE_ITEM_RE, BACKGROUND_RE, COMPACT_RE,
    CONTEXT_PCT_RE, CONTEXT_TOKENS_RE, EXTRA_AGENTS_RE, EXTRA_BASH_RE, EXTRA_FILES_RE,
    SELECTION_HINT_RE, SELECTION_SELECTED_RE, SELECTION_UNSELECTED_RE, STATUS_BAR_RE,
    THINKING_STAR_RE, TIMER_RE, TODO_HEADER_RE, TODO_ITEM_RE, USAGE_PCT_RE,
};

static THOUGHT_FOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(thought for (\d+s)\)").unwrap());

/// Detect a thinking indicator (star + ellipsis) from screen lines.
///
/// Returns the thinking message and the optional elapsed time parsed from a
/// `(thought for Ns)` parenthetical.
pub fn detect_thinking(lines: &[String]) -> Option<(String, Option<String>)> {
    for line in lines {
        if let Some(caps) = THINKING_STAR_RE.captures(line.trim()) {
            let text = caps[1].to_string();
            let elapsed = THOUGHT_FOR_RE
                .captures(&text)
                .map(|c| c[1].to_string());
            return Some((text, elapsed));
        }
    }
    None
}

/// Detect a tool approval selection menu: a question, numbered options with
/// a ❯ cursor, and an "Esc to cancel" hint.
pub fn detect_tool_request(lines: &[String]) -> Option<ToolRequest> {
    let mut has_selection = false;
    let mut has_hint = false;
    let mut options: Vec<(u32, String)> = Vec::new();
    let mut selected_number: Option<u32> = None;
    let mut question: Option<String> = None;

    for line in lines {
        let stripped = line.trim();

        // Question line (e.g. "Do you want to create test_capture.txt?")
        if stripped.ends_with('?') && !stripped.starts_with('❯') {
            question = Some(stripped.to_string());
        }

        // Selected option: ❯ N. text
        if let Some(caps) = SELECTION_SELECTED_RE.captures(stripped) {
            has_selection = true;
            let number: u32 = caps[1].parse().unwrap_or(0);
            options.push((number, caps[2].trim().to_string()));
            selected_number = Some(number);
            continue;
        }

        // Match on the raw line (not stripped) — indentation distinguishes
        // menu items from numbered lists in content
        if let Some(caps) = SELECTION_UNSELECTED_RE.captures(line) {
            if has_selection {
                options.push((caps[1].parse().unwrap_or(0), caps[2].trim().to_string()));
                continue;
            }
        }

        if SELECTION_HINT_RE.is_match(stripped) {
            has_hint = true;
        }
    }

    if !has_selection || options.len() < 2 {
        return None;
    }
    // Both ❯-prefixed and plain items may report the same option after a
    // repaint; dedup by number so nothing is counted twice.
    options.sort_by_key(|(n, _)| *n);
    options.dedup_by_key(|(n, _)| *n);
    if options.len() < 2 {
        return None;
    }
    Some(ToolRequest {
        question,
        options: options.into_iter().map(|(_, label)| label).collect(),
        selected: selected_number.map(|n| (n as usize).saturating_sub(1)).unwrap_or(0),
        has_hint,
    })
}

/// Detect a TODO list display: the header summary plus `◻/◼/✔` items.
pub fn detect_todo_list(lines: &[String]) -> Option<(Option<TodoCounts>, Vec<TodoItem>)> {
    let mut counts: Option<TodoCounts> = None;
    let mut items: Vec<TodoItem> = Vec::new();

    for line in lines {
        let stripped = line.trim();

        if let Some(caps) = TODO_HEADER_RE.captures(stripped) {
            counts = Some(TodoCounts {
                total: caps[1].parse().unwrap_or(0),
                done: caps[2].parse().unwrap_or(0),
                in_progress: caps
                    .get(3)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(0),
                open: caps[4].parse().unwrap_or(0),
            });
            continue;
        }

        if TODO_ITEM_RE.is_match(stripped) {
            let status = match stripped.chars().next() {
                Some('◼') => TodoStatus::InProgress,
                Some('✔') => TodoStatus::Completed,
                _ => TodoStatus::Pending,
            };
            let text = stripped[stripped.char_indices().nth(1).map(|(i, _)| i).unwrap_or(0)..]
                .trim()
                .to_string();
            if !text.is_empty() {
                items.push(TodoItem { text, status });
            }
        }
    }

    if counts.is_some() || !items.is_empty() {
        Some((counts, items))
    } else {
        None
    }
}

/// Detect a background task indicator ("… in the background").
pub fn detect_background_task(lines: &[String]) -> Option<String> {
    lines
        .iter()
        .find(|line| BACKGROUND_RE.is_match(line))
        .map(|line| line.trim().to_string())
}

/// Detect the parallel-agents display: launch count, `├─ name` tree items,
/// and `Agent "X" completed` lines.
pub fn detect_parallel_agents(lines: &[String]) -> Option<AgentsPayload> {
    let mut payload = AgentsPayload::default();

    for line in lines {
        let stripped = line.trim();

        if let Some(caps) = AGENTS_LAUNCHED_RE.captures(stripped) {
            payload.count = Some(caps[1].parse().unwrap_or(0));
            continue;
        }

        if let Some(caps) = AGENT_COMPLETE_RE.captures(stripped) {
            payload.completed.push(caps[1].to_string());
            continue;
        }

        // Agent tree items: ├─ name (description)
        if let Some(caps) = AGENT_TREE_ITEM_RE.captures(stripped) {
            let name = caps[1].trim();
            if !name.is_empty() {
                payload.agents.push(name.to_string());
            }
        }
    }

    if payload.count.is_some() || !payload.agents.is_empty() || !payload.completed.is_empty() {
        Some(payload)
    } else {
        None
    }
}

// ─── Status bar parsing ──────────────────────────────────────────────────────

/// Parsed fields of the bottom-of-screen status bar.
///
/// Real format: `my-project │ ⎇ main* ⇡12 │ Usage: 7% ▋░░░░░░░░░ ↻ 9:59`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusBar {
    pub project: Option<String>,
    pub branch: Option<String>,
    pub dirty: bool,
    pub commits_ahead: u32,
    pub usage_pct: Option<u32>,
    pub timer: Option<String>,
}

pub fn parse_status_bar(text: &str) -> Option<StatusBar> {
    if text.trim().is_empty() {
        return None;
    }
    let caps = STATUS_BAR_RE.captures(text)?;
    let project = caps.name("project")?.as_str().to_string();
    Some(StatusBar {
        project: Some(project),
        branch: caps.name("branch").map(|m| m.as_str().to_string()),
        dirty: caps.name("dirty").is_some(),
        commits_ahead: caps
            .name("ahead")
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0),
        usage_pct: caps.name("usage").and_then(|m| m.as_str().parse().ok()),
        timer: TIMER_RE
            .captures(text)
            .map(|c| c[1].to_string()),
    })
}

/// Counters from the extra status line below the main bar, e.g.
/// `1 bash · 1 file +194 -192`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtraStatus {
    pub bash_tasks: Option<u32>,
    pub local_agents: Option<u32>,
    pub files_changed: Option<u32>,
    pub lines_added: Option<u32>,
    pub lines_removed: Option<u32>,
}

pub fn parse_extra_status(text: &str) -> ExtraStatus {
    let mut result = ExtraStatus::default();
    if let Some(caps) = EXTRA_BASH_RE.captures(text) {
        result.bash_tasks = caps[1].parse().ok();
    }
    if let Some(caps) = EXTRA_AGENTS_RE.captures(text) {
        result.local_agents = caps[1].parse().ok();
    }
    if let Some(caps) = EXTRA_FILES_RE.captures(text) {
        result.files_changed = caps[1].parse().ok();
        result.lines_added = caps[2].parse().ok();
        result.lines_removed = caps[3].parse().ok();
    }
    result
}

/// Context window usage scraped from screen text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContextUsage {
    pub percentage: Option<u32>,
    pub needs_compact: bool,
}

pub fn detect_context_usage(text: &str) -> Option<ContextUsage> {
    if text.trim().is_empty() {
        return None;
    }

    let usage = USAGE_PCT_RE.captures(text);
    let pct = CONTEXT_PCT_RE.captures(text);
    let tokens = CONTEXT_TOKENS_RE.captures(text);
    let compact = COMPACT_RE.is_match(text);

    if usage.is_none() && pct.is_none() && tokens.is_none() && !compact {
        return None;
    }

    let percentage = if let Some(caps) = usage {
        caps[1].parse().ok()
    } else if let Some(caps) = pct {
        caps[1].parse().ok()
    } else if let Some(caps) = tokens {
        let used: f64 = caps[1].parse().unwrap_or(0.0);
        let total: f64 = caps[2].parse().unwrap_or(0.0);
        if total > 0.0 {
            Some((used / total * 100.0).round() as u32)
        } else {
            None
        }
    } else {
        None
    };

    Some(ContextUsage {
        percentage,
        needs_compact: compact,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    // ── Thinking ─────────────────────────────────────────────────────────────

    #[test]
    fn thinking_with_elapsed() {
        let l = lines(&["✻ Pondering… (thought for 5s)"]);
        let (text, elapsed) = detect_thinking(&l).unwrap();
        assert_eq!(text, "Pondering… (thought for 5s)");
        assert_eq!(elapsed.as_deref(), Some("5s"));
    }

    #[test]
    fn thinking_without_elapsed() {
        let l = lines(&["✶ Activating sleeper agents…"]);
        let (_, elapsed) = detect_thinking(&l).unwrap();
        assert!(elapsed.is_none());
    }

    // ── Tool request ─────────────────────────────────────────────────────────

    #[test]
    fn tool_request_full_menu() {
        let l = lines(&[
            " Do you want to create test_capture.txt?",
            " ❯ 1. Yes",
            "   2. Yes, allow all edits during this session (shift+tab)",
            "   3. No",
            "",
            " Esc to cancel · Tab to amend",
        ]);
        let req = detect_tool_request(&l).unwrap();
        assert_eq!(
            req.question.as_deref(),
            Some("Do you want to create test_capture.txt?")
        );
        assert_eq!(
            req.options,
            vec![
                "Yes",
                "Yes, allow all edits during this session (shift+tab)",
                "No"
            ]
        );
        assert_eq!(req.selected, 0);
        assert!(req.has_hint);
    }

    #[test]
    fn tool_request_dedups_repainted_options() {
        let l = lines(&[
            " Trust this folder?",
            " ❯ 1. Yes, I trust this folder",
            "   1. Yes, I trust this folder",
            "   2. No, exit",
        ]);
        let req = detect_tool_request(&l).unwrap();
        assert_eq!(req.options.len(), 2);
    }

    #[test]
    fn numbered_list_without_cursor_is_not_a_menu() {
        let l = lines(&["  1. first point", "  2. second point"]);
        assert!(detect_tool_request(&l).is_none());
    }

    #[test]
    fn single_option_is_not_a_menu() {
        let l = lines(&[" ❯ 1. Yes"]);
        assert!(detect_tool_request(&l).is_none());
    }

    // ── TODO list ────────────────────────────────────────────────────────────

    #[test]
    fn todo_list_with_header() {
        let l = lines(&[
            "  5 tasks (2 done, 1 in progress, 2 open) · ctrl+t to hide tasks",
            "  ◼ Fix substring-vs-set check",
            "  ◻ Fix stale docstring",
            "  ✔ Separate EOF from TIMEOUT",
        ]);
        let (counts, items) = detect_todo_list(&l).unwrap();
        let counts = counts.unwrap();
        assert_eq!(counts.total, 5);
        assert_eq!(counts.done, 2);
        assert_eq!(counts.in_progress, 1);
        assert_eq!(counts.open, 2);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].status, TodoStatus::InProgress);
        assert_eq!(items[1].status, TodoStatus::Pending);
        assert_eq!(items[2].status, TodoStatus::Completed);
    }

    #[test]
    fn todo_header_without_in_progress() {
        let l = lines(&["3 tasks (1 done, 2 open)"]);
        let (counts, _) = detect_todo_list(&l).unwrap();
        assert_eq!(counts.unwrap().in_progress, 0);
    }

    #[test]
    fn no_todo_on_plain_screen() {
        assert!(detect_todo_list(&lines(&["just some prose"])).is_none());
    }

    // ── Parallel agents ──────────────────────────────────────────────────────

    #[test]
    fn parallel_agents_tree() {
        let l = lines(&[
            "⏺ 4 agents launched (ctrl+o to expand)",
            "   ├─ code-reviewer (Code review of PR changes)",
            "   └─ comment-analyzer (Comment accuracy analysis)",
        ]);
        let agents = detect_parallel_agents(&l).unwrap();
        assert_eq!(agents.count, Some(4));
        assert_eq!(agents.agents.len(), 2);
    }

    #[test]
    fn agent_completion_lines() {
        let l = lines(&["Agent \"reviewer\" completed"]);
        let agents = detect_parallel_agents(&l).unwrap();
        assert_eq!(agents.completed, vec!["reviewer"]);
    }

    // ── Background task ──────────────────────────────────────────────────────

    #[test]
    fn background_task() {
        let l = lines(&["     Running in the background (↓ to manage)"]);
        assert_eq!(
            detect_background_task(&l).unwrap(),
            "Running in the background (↓ to manage)"
        );
    }

    // ── Status bar / context usage ───────────────────────────────────────────

    #[test]
    fn status_bar_fields() {
        let bar =
            parse_status_bar("my-project │ ⎇ main* ⇡12 │ Usage: 6% ▋░░░░░░░░░ ↻ 9:59").unwrap();
        assert_eq!(bar.project.as_deref(), Some("my-project"));
        assert_eq!(bar.branch.as_deref(), Some("main"));
        assert!(bar.dirty);
        assert_eq!(bar.commits_ahead, 12);
        assert_eq!(bar.usage_pct, Some(6));
        assert_eq!(bar.timer.as_deref(), Some("9:59"));
    }

    #[test]
    fn extra_status_counters() {
        let extra = parse_extra_status("1 bash · 1 file +194 -192");
        assert_eq!(extra.bash_tasks, Some(1));
        assert_eq!(extra.files_changed, Some(1));
        assert_eq!(extra.lines_added, Some(194));
        assert_eq!(extra.lines_removed, Some(192));
    }

    #[test]
    fn context_usage_from_percentage() {
        let usage = detect_context_usage("Usage: 32%").unwrap();
        assert_eq!(usage.percentage, Some(32));
        assert!(!usage.needs_compact);
    }

    #[test]
    fn context_usage_from_tokens() {
        let usage = detect_context_usage("90k / 200k tokens").unwrap();
        assert_eq!(usage.percentage, Some(45));
    }

    #[test]
    fn context_usage_none_on_plain_text() {
        assert!(detect_context_usage("nothing of interest").is_none());
    }
}
