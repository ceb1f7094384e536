// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Whole-screen classification.
//!
//! Three passes, in an order that matters: screen-wide UI (approval menus,
//! todo lists, agent trees) must win before transient indicators (thinking,
//! running tools), and those must win over the static last line (the prompt).
//! Only when none fire does the last painted line decide.  This ordering is
//! what lets a fast polling loop tell apart "still thinking" from "response
//! done".

use tracing::trace;

use crate::detectors::{
    detect_background_task, detect_parallel_agents, detect_thinking, detect_todo_list,
    detect_tool_request,
};
use crate::models::{ScreenEvent, ScreenPayload, TerminalView};
use crate::patterns::{
    AUTH_OAUTH_URL_RE, AUTH_PASTE_CODE_RE, AUTH_SIGN_IN_RE, BARE_TIME_RE, CLI_HINT_RE, ERROR_RE,
    EXTRA_AGENTS_RE, EXTRA_BASH_RE, EXTRA_FILES_RE, LOGO_RE, PR_INDICATOR_RE, PROMPT_MARKER_RE,
    RESPONSE_MARKER_RE, SEPARATOR_PREFIX_RE, SEPARATOR_RE, STARTUP_RE, STATUS_BAR_RE, TIMER_RE,
    TIP_RE, TOOL_BASH_RE, TOOL_DIFF_RE, TOOL_FILE_RE, TOOL_HOOKS_RE, TOOL_STATUS_RE,
};

/// Extract tool name and target from the nearest tool header on screen.
fn extract_tool_info(lines: &[String]) -> Option<(String, String)> {
    for line in lines {
        if let Some(caps) = TOOL_BASH_RE.captures(line) {
            return Some(("Bash".to_string(), caps[1].to_string()));
        }
        if let Some(caps) = TOOL_FILE_RE.captures(line) {
            let tool = if line.contains("Write") {
                "Write"
            } else if line.contains("Update") {
                "Update"
            } else {
                "Read"
            };
            return Some((tool.to_string(), caps[1].to_string()));
        }
    }
    None
}

fn is_separator(s: &str) -> bool {
    SEPARATOR_RE.is_match(s) || SEPARATOR_PREFIX_RE.is_match(s)
}

/// The auth/login screen check.  Kept independent of the pass ladder; it
/// outranks the startup fallback because the OAuth screen also paints the
/// banner and logo glyphs.
fn is_auth_screen(lines: &[String]) -> bool {
    lines.iter().any(|line| {
        AUTH_OAUTH_URL_RE.is_match(line)
            || AUTH_PASTE_CODE_RE.is_match(line)
            || AUTH_SIGN_IN_RE.is_match(line)
    })
}

/// Classify the current screen state from terminal display lines.
///
/// Total: every display produces exactly one [`TerminalView`], with
/// `Unknown` as the explicit fallback.
pub fn classify_screen_state(lines: &[String]) -> ScreenEvent {
    let raw = lines.to_vec();
    let non_empty: Vec<&String> = lines.iter().filter(|l| !l.trim().is_empty()).collect();
    trace!(
        lines = lines.len(),
        non_empty = non_empty.len(),
        "classify_screen_state"
    );

    if non_empty.is_empty() {
        return ScreenEvent::bare(TerminalView::Unknown, raw);
    }

    // --- First pass: screen-wide patterns (need full context) ---

    // 1. Tool approval / selection menu (needs user action, highest priority)
    if let Some(request) = detect_tool_request(lines) {
        return ScreenEvent::new(
            TerminalView::ToolRequest,
            ScreenPayload::ToolRequest(request),
            raw,
        );
    }

    // 2. TODO list
    if let Some((counts, items)) = detect_todo_list(lines) {
        return ScreenEvent::new(
            TerminalView::TodoList,
            ScreenPayload::TodoList { counts, items },
            raw,
        );
    }

    // 3. Parallel agents
    if let Some(agents) = detect_parallel_agents(lines) {
        return ScreenEvent::new(
            TerminalView::ParallelAgents,
            ScreenPayload::ParallelAgents(agents),
            raw,
        );
    }

    // --- Second pass: bottom-up scan for current activity ---

    // Find the last meaningful line, skipping every pattern the line
    // classifier considers non-content UI: status bars, separators (plain
    // and with column-bleed overlay), tips, bare times, CLI hints, timers,
    // counters, PR indicators.  Missing any of these stops the scan on a
    // chrome line and breaks IDLE detection (the ❯ never becomes last_line).
    let mut active_idx = lines.len() as i64 - 1;
    while active_idx >= 0 {
        let stripped = lines[active_idx as usize].trim();
        if !stripped.is_empty()
            && !STATUS_BAR_RE.is_match(stripped)
            && !is_separator(stripped)
            && !TIP_RE.is_match(stripped)
            && !BARE_TIME_RE.is_match(stripped)
            && !CLI_HINT_RE.is_match(stripped)
            && !TIMER_RE.is_match(stripped)
            && !EXTRA_BASH_RE.is_match(stripped)
            && !EXTRA_AGENTS_RE.is_match(stripped)
            && !EXTRA_FILES_RE.is_match(stripped)
            && !PR_INDICATOR_RE.is_match(stripped)
        {
            break;
        }
        active_idx -= 1;
    }

    if active_idx < 0 {
        return ScreenEvent::bare(TerminalView::Unknown, raw);
    }
    let active_idx = active_idx as usize;

    // The bottom content area: the last ~8 meaningful lines
    let bottom_start = active_idx.saturating_sub(7);
    let bottom_lines = &lines[bottom_start..=active_idx];

    // 4. Thinking indicator
    if let Some((text, elapsed)) = detect_thinking(bottom_lines) {
        return ScreenEvent::new(
            TerminalView::Thinking,
            ScreenPayload::Thinking { text, elapsed },
            raw,
        );
    }

    // 5. Tool running/waiting
    if bottom_lines
        .iter()
        .rev()
        .any(|line| TOOL_STATUS_RE.is_match(line) || TOOL_HOOKS_RE.is_match(line))
    {
        let (tool, target) = extract_tool_info(lines).unwrap_or_default();
        return ScreenEvent::new(
            TerminalView::ToolRunning,
            ScreenPayload::ToolRunning { tool, target },
            raw,
        );
    }

    // 6. Tool result (diff summary)
    for line in bottom_lines.iter().rev() {
        if let Some(caps) = TOOL_DIFF_RE.captures(line) {
            return ScreenEvent::new(
                TerminalView::ToolResult,
                ScreenPayload::ToolResult {
                    added: caps[1].parse().unwrap_or(0),
                    removed: caps[2].parse().unwrap_or(0),
                },
                raw,
            );
        }
    }

    // 7. Background task
    if let Some(text) = detect_background_task(bottom_lines) {
        return ScreenEvent::new(
            TerminalView::BackgroundTask,
            ScreenPayload::Background { raw: text },
            raw,
        );
    }

    // --- Third pass: the last meaningful line ---

    let last_line = lines[active_idx].trim().to_string();

    // 8. IDLE: ❯ between separators — 3-line gap tolerance because the
    //    emulator may insert blank/artifact rows between separator and
    //    prompt.  Both the pure separator and the column-bleed variant count.
    if PROMPT_MARKER_RE.is_match(&last_line) {
        let above = (active_idx.saturating_sub(3)..active_idx)
            .rev()
            .map(|i| lines[i].trim())
            .any(|s| !s.is_empty() && is_separator(s));
        let below = (active_idx + 1..lines.len().min(active_idx + 4))
            .map(|i| lines[i].trim())
            .any(|s| !s.is_empty() && is_separator(s));
        if above && below {
            let placeholder = last_line.trim_start_matches('❯').trim_start().to_string();
            return ScreenEvent::new(
                TerminalView::Idle,
                ScreenPayload::Idle { placeholder },
                raw,
            );
        }
    }

    // 9. Streaming: a ⏺ response marker visible AFTER the most recent ❯
    //    prompt line.  The "after the last prompt" guard is mandatory: the
    //    emulator never clears old responses, so a stale ⏺ from a prior turn
    //    must not classify as a fresh stream during the user-echo phase.
    let last_prompt_idx = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| PROMPT_MARKER_RE.is_match(line.trim()))
        .map(|(i, _)| i as i64)
        .last()
        .unwrap_or(-1);

    for line in lines.iter().skip((last_prompt_idx + 1) as usize) {
        let stripped = line.trim();
        if stripped.is_empty() {
            continue;
        }
        if let Some(caps) = RESPONSE_MARKER_RE.captures(stripped) {
            return ScreenEvent::new(
                TerminalView::Streaming,
                ScreenPayload::Streaming {
                    text: caps[1].to_string(),
                },
                raw,
            );
        }
    }

    // 10. User message: ❯ followed by text, no surrounding separator pair
    if PROMPT_MARKER_RE.is_match(&last_line) {
        let text = last_line.trim_start_matches('❯').trim_start().to_string();
        return ScreenEvent::new(TerminalView::UserMessage, ScreenPayload::UserMessage { text }, raw);
    }

    // 10b. Auth/login screen.  Checked before the startup fallback: the
    // OAuth screen carries the version banner and logo art, so without this
    // ordering it would classify as STARTUP and the login would go unnoticed.
    if is_auth_screen(lines) {
        return ScreenEvent::bare(TerminalView::AuthRequired, raw);
    }

    // 11. Startup — only if no ⏺ response marker is visible anywhere.  The
    // banner persists in the emulator buffer because the TUI redraws
    // in-place rather than scrolling; without this guard every later screen
    // would match STARTUP as a fallback.
    let has_response = non_empty
        .iter()
        .any(|l| RESPONSE_MARKER_RE.is_match(l.trim()));
    if !has_response {
        for line in non_empty.iter().take(10) {
            let stripped = line.trim();
            if STARTUP_RE.is_match(stripped) {
                return ScreenEvent::bare(TerminalView::Startup, raw);
            }
            if LOGO_RE.is_match(stripped) {
                let logo_chars = stripped
                    .chars()
                    .filter(|c| matches!(c, '▐' | '▛' | '▜' | '▌' | '▝' | '▘' | '█' | '▞' | '▚'))
                    .count();
                if logo_chars >= 3 {
                    return ScreenEvent::bare(TerminalView::Startup, raw);
                }
            }
        }
    }

    // 12. Error
    for line in &non_empty {
        if ERROR_RE.is_match(line) {
            return ScreenEvent::new(
                TerminalView::Error,
                ScreenPayload::Error {
                    text: line.trim().to_string(),
                },
                raw,
            );
        }
    }

    ScreenEvent::bare(TerminalView::Unknown, raw)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn screen(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    const STATUS: &str = "  my-project │ ⎇ main* ⇡12 │ Usage: 6% ▋░░░░░░░░░ ↻ 9:59";

    #[test]
    fn empty_screen_is_unknown() {
        let event = classify_screen_state(&screen(&["", "", ""]));
        assert_eq!(event.view, TerminalView::Unknown);
    }

    #[test]
    fn idle_prompt_between_separators() {
        let event = classify_screen_state(&screen(&[
            "",
            "⏺ ping",
            "",
            "────────────────────────────────────────────",
            "❯ Try \"write a test for config.py\"",
            "────────────────────────────────────────────",
            STATUS,
        ]));
        assert_eq!(event.view, TerminalView::Idle);
        assert_eq!(
            event.payload,
            ScreenPayload::Idle {
                placeholder: "Try \"write a test for config.py\"".to_string()
            }
        );
    }

    #[test]
    fn bare_prompt_is_idle_with_empty_placeholder() {
        let event = classify_screen_state(&screen(&[
            "────────────────────────────────────────────",
            "",
            "❯",
            "",
            "────────────────────────────────────────────",
        ]));
        assert_eq!(event.view, TerminalView::Idle);
        assert_eq!(
            event.payload,
            ScreenPayload::Idle {
                placeholder: String::new()
            }
        );
    }

    #[test]
    fn thinking_beats_idle() {
        let event = classify_screen_state(&screen(&[
            "",
            "❯ What is 2+2?",
            "",
            "✶ Activating sleeper agents…",
            "",
            "────────────────────────────────────────────",
            STATUS,
        ]));
        assert_eq!(event.view, TerminalView::Thinking);
    }

    #[test]
    fn streaming_marker_after_prompt() {
        let event = classify_screen_state(&screen(&[
            "",
            "❯ What is 2+2?",
            "",
            "⏺ The answer is 4.",
            "",
            "────────────────────────────────────────────",
            STATUS,
        ]));
        assert_eq!(event.view, TerminalView::Streaming);
        assert_eq!(
            event.payload,
            ScreenPayload::Streaming {
                text: "The answer is 4.".to_string()
            }
        );
    }

    #[test]
    fn stale_marker_above_prompt_is_not_streaming() {
        // A ⏺ from the previous turn is still painted above the fresh ❯
        // echo; it must not classify as a new stream.
        let event = classify_screen_state(&screen(&[
            "⏺ old response from last turn",
            "",
            "❯ new question being typed",
            "",
            "────────────────────────────────────────────",
            STATUS,
        ]));
        assert_eq!(event.view, TerminalView::UserMessage);
    }

    #[test]
    fn marker_above_bottom_region_still_streams() {
        let event = classify_screen_state(&screen(&[
            "❯ question",
            "⏺ a very long answer that started scrolling",
            "  more of the answer",
            "  and more",
            "  and more",
            "  and more",
            "  and more",
            "  and more",
            "  and more",
            "  and more",
            "  and more",
            "  tail of the answer",
        ]));
        assert_eq!(event.view, TerminalView::Streaming);
    }

    #[test]
    fn tool_request_menu() {
        let event = classify_screen_state(&screen(&[
            "",
            " Do you want to create test_capture.txt?",
            " ❯ 1. Yes",
            "   2. Yes, allow all edits during this session (shift+tab)",
            "   3. No",
            "",
            " Esc to cancel · Tab to amend",
        ]));
        assert_eq!(event.view, TerminalView::ToolRequest);
        let ScreenPayload::ToolRequest(req) = event.payload else {
            panic!("expected tool request payload");
        };
        assert_eq!(req.options.len(), 3);
        assert_eq!(req.selected, 0);
        assert!(req.has_hint);
    }

    #[test]
    fn tool_running_with_command() {
        let event = classify_screen_state(&screen(&[
            "",
            "  Bash(echo 'capture_test_ok')",
            "  ⎿  Running…",
            "",
            "────────────────────────────────────────────",
            STATUS,
        ]));
        assert_eq!(event.view, TerminalView::ToolRunning);
        assert_eq!(
            event.payload,
            ScreenPayload::ToolRunning {
                tool: "Bash".to_string(),
                target: "echo 'capture_test_ok'".to_string()
            }
        );
    }

    #[test]
    fn tool_result_diff_counts() {
        let event = classify_screen_state(&screen(&[
            "",
            "  ⎿  Added 4 lines, removed 1 line",
            "",
            "────────────────────────────────────────────",
            STATUS,
        ]));
        assert_eq!(event.view, TerminalView::ToolResult);
        assert_eq!(
            event.payload,
            ScreenPayload::ToolResult {
                added: 4,
                removed: 1
            }
        );
    }

    #[test]
    fn todo_list_screen() {
        let event = classify_screen_state(&screen(&[
            "  5 tasks (2 done, 1 in progress, 2 open) · ctrl+t to hide tasks",
            "  ◼ Fix substring-vs-set check",
            "  ◻ Fix stale docstring",
            "  ✔ Separate EOF from TIMEOUT",
            "",
            "────────────────────────────────────────────",
            STATUS,
        ]));
        assert_eq!(event.view, TerminalView::TodoList);
    }

    #[test]
    fn parallel_agents_screen() {
        let event = classify_screen_state(&screen(&[
            "⏺ 4 agents launched (ctrl+o to expand)",
            "   ├─ code-reviewer (Code review of PR changes)",
            "   └─ comment-analyzer (Comment accuracy analysis)",
            "",
            "  4 local agents · 1 file +194 -192",
        ]));
        assert_eq!(event.view, TerminalView::ParallelAgents);
    }

    #[test]
    fn background_task_screen() {
        let event = classify_screen_state(&screen(&[
            "",
            "⏺ 60-second timer launched.",
            "     Running in the background (↓ to manage)",
            "",
            "────────────────────────────────────────────",
            STATUS,
            "  1 bash · 1 file +194 -192",
        ]));
        // The ⏺ line sits above the background indicator in the bottom
        // region, and background wins over the last-line pass.
        assert_eq!(event.view, TerminalView::BackgroundTask);
    }

    #[test]
    fn startup_banner_screen() {
        let event = classify_screen_state(&screen(&[
            "            Claude Code v2.1.37",
            "  ▐▛███▜▌   Opus 4.6 · Claude Max",
            " ▝▜█████▛▘  ~/dev/my-project",
            "",
            "   General tip: Leave code cleaner than found",
        ]));
        assert_eq!(event.view, TerminalView::Startup);
    }

    #[test]
    fn startup_suppressed_once_response_visible() {
        let event = classify_screen_state(&screen(&[
            "            Claude Code v2.1.37",
            "  ▐▛███▜▌   Opus 4.6 · Claude Max",
            "",
            "⏺ The answer is 4.",
        ]));
        assert_eq!(event.view, TerminalView::Streaming);
    }

    #[test]
    fn user_message_without_separators() {
        let event = classify_screen_state(&screen(&[
            "",
            "❯ What is 2+2? Reply with just the number, nothing else.",
            "",
            "────────────────────────────────────────────",
            STATUS,
        ]));
        assert_eq!(event.view, TerminalView::UserMessage);
        assert_eq!(
            event.payload,
            ScreenPayload::UserMessage {
                text: "What is 2+2? Reply with just the number, nothing else.".to_string()
            }
        );
    }

    #[test]
    fn error_screen() {
        let event = classify_screen_state(&screen(&[
            "",
            "1 MCP server failed · /mcp",
            "",
            "────────────────────────────────────────────",
            STATUS,
        ]));
        assert_eq!(event.view, TerminalView::Error);
    }

    #[test]
    fn auth_screen_beats_startup() {
        let event = classify_screen_state(&screen(&[
            "Welcome to Claude Code v2.1.39",
            "       █████████",
            "      ██▄█████▄██",
            " Browser didn't open? Use the url below to sign in (c to copy)",
            "https://claude.ai/oauth/authorize?code=true&client_id=9d1c250a",
            " Paste code here if prompted >",
        ]));
        assert_eq!(event.view, TerminalView::AuthRequired);
    }

    #[test]
    fn totality_over_arbitrary_lines() {
        // Any display classifies to exactly one view without panicking.
        let weird = screen(&["\u{FFFD}\u{FFFD}", "ᚠᚢᚦ", "  ", "12345", "❯❯❯", "⏺"]);
        let _ = classify_screen_state(&weird);
    }
}
