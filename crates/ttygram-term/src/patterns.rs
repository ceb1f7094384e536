// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! UI patterns of the Claude Code TUI and the per-line classifier.
//!
//! The patterns are literal: screen-classifier correctness depends on them
//! matching exactly what the TUI paints, replacement-character artifacts and
//! column bleed included.

use std::sync::LazyLock;

use regex::Regex;

macro_rules! re {
    ($name:ident, $pattern:expr) => {
        pub(crate) static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($pattern).unwrap());
    };
}

// Trailing U+FFFD allowed because partial ANSI sequences render as
// replacement characters at the end of a repainted separator row.
re!(SEPARATOR_RE, r"^[─━═]{4,}\u{FFFD}*$");
// Separator with trailing text overlay (status text bleeds into the row)
re!(SEPARATOR_PREFIX_RE, r"^[─━═]{20,}");
re!(DIFF_DELIMITER_RE, r"^╌{4,}\u{FFFD}*$");
re!(
    STATUS_BAR_RE,
    r"(?P<project>[\w\-]+)\s*│\s*(?:⎇\s*(?P<branch>[\w\-/]+)(?P<dirty>\*)?)?\s*(?:⇡(?P<ahead>\d+)\s*)?│?\s*(?:Usage:\s*(?P<usage>\d+)%)?"
);
re!(TIMER_RE, r"↻\s*([\d:]+)");
// (?:\s|$) instead of \s to handle a bare ❯ at end of line
re!(PROMPT_MARKER_RE, r"^❯(?:\s|$)");
re!(BOX_CHAR_RE, r"[╭╮╰╯│├┤┬┴┼┌┐└┘]");
re!(LOGO_RE, r"[▐▛▜▌▝▘█▞▚]");

// Thinking stars: ✶✳✻✽✢· followed by text ending with …
re!(THINKING_STAR_RE, r"^[✶✳✻✽✢·]\s+(.+…(?:\s*\(.+\))?)$");

// Response marker
re!(RESPONSE_MARKER_RE, r"^⏺\s+(.*)");

// Auth/login screen indicators
re!(AUTH_SIGN_IN_RE, r"(?i)sign in|log in");
re!(AUTH_PASTE_CODE_RE, r"(?i)Paste code here");
re!(AUTH_OAUTH_URL_RE, r"claude\.ai/oauth/authorize");

// Tool connector
re!(TOOL_CONNECTOR_RE, r"^\s*⎿");

// Tool running/waiting status
re!(TOOL_STATUS_RE, r"^\s*⎿\s+(Running|Waiting)…");
re!(TOOL_HOOKS_RE, r"^\s*⎿\s+Running \w+ hooks…");

// Tool diff result
re!(TOOL_DIFF_RE, r"^\s*⎿\s+Added (\d+) lines?, removed (\d+) lines?");

// Tool header patterns.
// Optional ⏺ prefix: tool calls are sometimes wrapped in response markers.
re!(
    TOOL_HEADER_LINE_RE,
    r"^\s*(?:⏺\s+)?(?:Bash\(|Write\(|Update\(|Read(?:ing)?\s*[\d(]|Searched\s+for\s)"
);
re!(TOOL_BASH_RE, r"Bash\((.+?)\)");
re!(TOOL_FILE_RE, r"(?:Write|Update|Read(?:ing)?)\((.+?)\)");

// Selection menu
re!(SELECTION_SELECTED_RE, r"^\s*❯\s+(\d+)\.\s+(.+)$");
re!(SELECTION_UNSELECTED_RE, r"^\s+(\d+)\.\s+(.+)$");
re!(SELECTION_HINT_RE, r"Esc to cancel");

// Background task
re!(BACKGROUND_RE, r"in the background");

// Parallel agents
re!(AGENTS_LAUNCHED_RE, r"(\d+) agents? launched");
re!(AGENT_TREE_ITEM_RE, r"^\s*[├└]\s*─\s*(.*)");
re!(AGENT_COMPLETE_RE, r#"Agent "(.+?)" completed"#);
re!(AGENT_TREE_TEXT_RE, r"^[├└]\s*─+\s+\w");

// TODO list
re!(
    TODO_HEADER_RE,
    r"(\d+) tasks? \((\d+) done(?:, (\d+) in progress)?, (\d+) open\)"
);
re!(TODO_ITEM_RE, r"^[◻◼✔]\s+");

// Error patterns
re!(ERROR_RE, r"(?i)MCP server failed|(?:^|\s)Error:|ENOENT|EPERM");

// Startup
re!(STARTUP_RE, r"Claude Code v[\d.]+");

// Status bar tip / hint lines
re!(TIP_RE, r"^(?:\w+\s+)?[Tt]ip:\s");
re!(BARE_TIME_RE, r"^\d{1,2}:\d{2}$");
re!(CLI_HINT_RE, r"claude\s+--(?:continue|resume)");

// PR indicator in the status bar area (standalone "PR #13" line)
re!(PR_INDICATOR_RE, r"^PR\s*#\d+$");

// Context window progress bar (block elements) and/or timer (↻ H:MM)
re!(CONTEXT_TIMER_RE, r"↻\s*\d+:\d+");
re!(PROGRESS_BAR_RE, r"^[▊▉█▌▍▎▏░▒▓\s]+$");

// Extra status line counters
re!(EXTRA_BASH_RE, r"(\d+) bash");
re!(EXTRA_AGENTS_RE, r"(\d+) local agents?");
re!(EXTRA_FILES_RE, r"(\d+) files? \+(\d+) -(\d+)");

// Usage detectors (for the /context command)
re!(USAGE_PCT_RE, r"(?i)Usage:\s*(\d+)%");
re!(CONTEXT_PCT_RE, r"(?i)(?:context|ctx)[:\s]*(\d+)\s*%");
re!(CONTEXT_TOKENS_RE, r"(?i)(\d+)k\s*/\s*(\d+)k\s*tokens");
re!(COMPACT_RE, r"(?i)compact|context.*(?:full|almost|running out)");

/// Semantic category of a single display line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCategory {
    Empty,
    Separator,
    DiffDelimiter,
    StatusBar,
    Startup,
    Thinking,
    ToolHeader,
    Response,
    ToolConnector,
    TodoItem,
    AgentTree,
    Prompt,
    Box,
    Logo,
    Content,
}

impl LineCategory {
    /// Chrome categories are the non-content UI the dedup snapshotting and
    /// content extraction both filter out.
    pub fn is_chrome(self) -> bool {
        matches!(
            self,
            LineCategory::Separator
                | LineCategory::DiffDelimiter
                | LineCategory::StatusBar
                | LineCategory::Prompt
                | LineCategory::Thinking
                | LineCategory::Startup
                | LineCategory::Logo
                | LineCategory::Box
                | LineCategory::Empty
        )
    }
}

/// Classify a screen line as a UI element or content.
///
/// Rules are priority-ordered; the first match wins.
pub fn classify_text_line(line: &str) -> LineCategory {
    let stripped = line.trim();
    if stripped.is_empty() {
        return LineCategory::Empty;
    }
    if SEPARATOR_RE.is_match(stripped) {
        return LineCategory::Separator;
    }
    // Separator with trailing text overlay from adjacent columns
    if SEPARATOR_PREFIX_RE.is_match(stripped) {
        return LineCategory::Separator;
    }
    if DIFF_DELIMITER_RE.is_match(stripped) {
        return LineCategory::DiffDelimiter;
    }
    // Startup banner line — must be filtered to prevent leaking into
    // response content when the emulator repaints the screen.
    if STARTUP_RE.is_match(stripped) {
        return LineCategory::Startup;
    }
    // Pre-check: require distinctive status bar markers (⎇ branch or Usage:)
    // to avoid false positives on table data rows containing │
    if (stripped.contains('⎇') || stripped.contains("Usage:"))
        && STATUS_BAR_RE.is_match(stripped)
    {
        return LineCategory::StatusBar;
    }
    // Tip/hint lines
    if TIP_RE.is_match(stripped) {
        return LineCategory::StatusBar;
    }
    if BARE_TIME_RE.is_match(stripped) {
        return LineCategory::StatusBar;
    }
    if CLI_HINT_RE.is_match(stripped) {
        return LineCategory::StatusBar;
    }
    if PR_INDICATOR_RE.is_match(stripped) {
        return LineCategory::StatusBar;
    }
    // Extra status line: "4 files +0 -0 · PR #5", "1 bash · 1 file +194 -192".
    // EXTRA_FILES_RE has a very specific format (N files? +N -N) that doesn't
    // appear in prose; the bash/agents counters require a · separator so that
    // prose containing "bash" or "local agents" stays content.
    if EXTRA_FILES_RE.is_match(stripped) {
        return LineCategory::StatusBar;
    }
    if stripped.contains('·')
        && (EXTRA_BASH_RE.is_match(stripped) || EXTRA_AGENTS_RE.is_match(stripped))
    {
        return LineCategory::StatusBar;
    }
    // Context window progress bar and/or timer (e.g. "▊░░░░░░░░░ ↻ 11:00")
    if CONTEXT_TIMER_RE.is_match(stripped) {
        return LineCategory::StatusBar;
    }
    if PROGRESS_BAR_RE.is_match(stripped) {
        return LineCategory::StatusBar;
    }
    if THINKING_STAR_RE.is_match(stripped) {
        return LineCategory::Thinking;
    }
    if TOOL_HEADER_LINE_RE.is_match(stripped) {
        return LineCategory::ToolHeader;
    }
    if stripped.starts_with('⏺') {
        return LineCategory::Response;
    }
    if TOOL_CONNECTOR_RE.is_match(stripped) {
        return LineCategory::ToolConnector;
    }
    if TODO_ITEM_RE.is_match(stripped) {
        return LineCategory::TodoItem;
    }
    // Agent tree: ├─ name or └─ name (must have text after the dash,
    // not a pure border)
    if AGENT_TREE_TEXT_RE.is_match(stripped) {
        return LineCategory::AgentTree;
    }
    if PROMPT_MARKER_RE.is_match(stripped) {
        return LineCategory::Prompt;
    }
    // Box detection: 2+ box-drawing chars AND length > 10, but only when the
    // line is mostly structural.  Rows with substantial alphabetic content
    // between box chars are table data from a response — keep those content.
    if BOX_CHAR_RE.is_match(stripped) && stripped.chars().count() > 10 {
        let box_chars = stripped
            .chars()
            .filter(|c| matches!(c, '╭' | '╮' | '╰' | '╯' | '│' | '├' | '┤' | '┬' | '┴' | '┼' | '┌' | '┐' | '└' | '┘'))
            .count();
        if box_chars >= 2 {
            let alpha_chars = stripped.chars().filter(|c| c.is_alphabetic()).count();
            if alpha_chars <= 3 {
                return LineCategory::Box;
            }
        }
    }
    // 3+ block-element chars distinguish the logo from occasional Unicode
    // in content
    if LOGO_RE.is_match(stripped) {
        let logo_chars = stripped
            .chars()
            .filter(|c| matches!(c, '▐' | '▛' | '▜' | '▌' | '▝' | '▘' | '█' | '▞' | '▚'))
            .count();
        if logo_chars >= 3 {
            return LineCategory::Logo;
        }
    }
    LineCategory::Content
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
