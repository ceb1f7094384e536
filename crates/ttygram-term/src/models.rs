// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Screen-level classification types.

/// High-level state painted on the terminal screen.
///
/// A closed set: every possible display classifies to exactly one view,
/// with [`TerminalView::Unknown`] as the explicit fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalView {
    Startup,
    Idle,
    Thinking,
    Streaming,
    UserMessage,
    ToolRequest,
    ToolRunning,
    ToolResult,
    BackgroundTask,
    ParallelAgents,
    TodoList,
    AuthRequired,
    Error,
    Unknown,
}

/// A detected tool approval / selection menu.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolRequest {
    pub question: Option<String>,
    pub options: Vec<String>,
    /// Zero-based index of the currently highlighted option.
    pub selected: usize,
    pub has_hint: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoItem {
    pub text: String,
    pub status: TodoStatus,
}

/// Counts parsed from the TODO list header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TodoCounts {
    pub total: u32,
    pub done: u32,
    pub in_progress: u32,
    pub open: u32,
}

/// Parsed parallel-agents display.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AgentsPayload {
    pub count: Option<u32>,
    pub agents: Vec<String>,
    pub completed: Vec<String>,
}

/// Extracted payload for a classified screen, one variant per view that
/// carries data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScreenPayload {
    #[default]
    None,
    Idle {
        placeholder: String,
    },
    Streaming {
        text: String,
    },
    UserMessage {
        text: String,
    },
    Thinking {
        text: String,
        elapsed: Option<String>,
    },
    ToolRequest(ToolRequest),
    ToolRunning {
        tool: String,
        target: String,
    },
    ToolResult {
        added: u32,
        removed: u32,
    },
    TodoList {
        counts: Option<TodoCounts>,
        items: Vec<TodoItem>,
    },
    ParallelAgents(AgentsPayload),
    Background {
        raw: String,
    },
    Error {
        text: String,
    },
}

/// One classification of the current screen snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenEvent {
    pub view: TerminalView,
    pub payload: ScreenPayload,
    pub raw_lines: Vec<String>,
}

impl ScreenEvent {
    pub fn new(view: TerminalView, payload: ScreenPayload, raw_lines: Vec<String>) -> Self {
        Self {
            view,
            payload,
            raw_lines,
        }
    }

    pub fn bare(view: TerminalView, raw_lines: Vec<String>) -> Self {
        Self::new(view, ScreenPayload::None, raw_lines)
    }

    /// The same event reclassified as [`TerminalView::Unknown`], payload and
    /// raw lines preserved.  Used by pipeline overrides that suppress stale
    /// detections.
    pub fn into_unknown(mut self) -> Self {
        self.view = TerminalView::Unknown;
        self
    }
}
