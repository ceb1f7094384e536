// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Terminal-to-semantics layer.
//!
//! Raw PTY bytes go into a virtual terminal ([`TerminalEmulator`]); what
//! comes out is a classified view of the screen ([`ScreenEvent`]) plus the
//! response content reassembled from painted cells — with indentation
//! preserved and UI chrome stripped.
//!
//! The pipeline reads the same underlying grid twice per poll: once as plain
//! text for regex classification, once as attributed [`CharSpan`]s so the
//! region classifier can use foreground color as a code-vs-prose signal.

mod detectors;
mod emulator;
mod extract;
mod models;
mod patterns;
mod regions;
mod screen;
mod span;

pub use detectors::{
    detect_background_task, detect_context_usage, detect_parallel_agents, detect_thinking,
    detect_todo_list, detect_tool_request, parse_extra_status, parse_status_bar, ContextUsage,
    ExtraStatus, StatusBar,
};
pub use emulator::TerminalEmulator;
pub use extract::{
    dedent_attr_lines, extract_content, filter_response_attr, find_last_prompt,
    strip_response_markers,
};
pub use models::{
    AgentsPayload, ScreenEvent, ScreenPayload, TerminalView, TodoCounts, TodoItem, TodoStatus,
    ToolRequest,
};
pub use patterns::{classify_text_line, LineCategory};
pub use regions::{classify_attr_line, classify_regions, ContentRegion, LineType, RegionType};
pub use screen::classify_screen_state;
pub use span::{CharSpan, Fg};
