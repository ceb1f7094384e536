// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Pipeline phases, the transition table, and per-session state.
//!
//! The `(phase, observed view)` table is enumerated as one literal block
//! on purpose.  Conditional chains expressing the same semantics drifted
//! apart repeatedly during development; a flat table keeps every
//! transition auditable at a glance.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use ttygram_term::{TerminalEmulator, TerminalView};

use crate::chat::ChatApi;
use crate::stream::StreamingMessage;

/// Behavioral state of the output pipeline for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelinePhase {
    /// Idle; no pending chat message.
    Dormant,
    /// "Thinking…" placeholder sent, typing indicator active.
    Thinking,
    /// Content flowing, message being edited in place.
    Streaming,
    /// Tool approval keyboard sent, waiting for the user.
    ToolPending,
}

/// Side effects a transition fires, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SendThinking,
    SendKeyboard,
    SendAuthWarning,
    ExtractAndSend,
    Finalize,
}

use Action::*;
use PipelinePhase as P;
use TerminalView as V;

type Entry = ((PipelinePhase, TerminalView), (PipelinePhase, &'static [Action]));

/// The complete transition table.  Pairs not listed keep their phase and
/// fire nothing.
pub const TRANSITIONS: &[Entry] = &[
    // ── Dormant ──────────────────────────────────────────────────────────────
    ((P::Dormant, V::Thinking), (P::Thinking, &[SendThinking])),
    ((P::Dormant, V::Streaming), (P::Streaming, &[ExtractAndSend])),
    ((P::Dormant, V::ToolRequest), (P::ToolPending, &[SendKeyboard])),
    ((P::Dormant, V::AuthRequired), (P::Dormant, &[SendAuthWarning])),
    ((P::Dormant, V::Error), (P::Streaming, &[ExtractAndSend])),
    ((P::Dormant, V::TodoList), (P::Streaming, &[ExtractAndSend])),
    ((P::Dormant, V::ParallelAgents), (P::Streaming, &[ExtractAndSend])),
    ((P::Dormant, V::BackgroundTask), (P::Streaming, &[ExtractAndSend])),
    // ── Thinking ─────────────────────────────────────────────────────────────
    ((P::Thinking, V::Streaming), (P::Streaming, &[ExtractAndSend])),
    ((P::Thinking, V::Idle), (P::Dormant, &[ExtractAndSend, Finalize])),
    ((P::Thinking, V::ToolRequest), (P::ToolPending, &[Finalize, SendKeyboard])),
    ((P::Thinking, V::AuthRequired), (P::Dormant, &[Finalize, SendAuthWarning])),
    ((P::Thinking, V::Error), (P::Dormant, &[ExtractAndSend, Finalize])),
    ((P::Thinking, V::TodoList), (P::Streaming, &[ExtractAndSend])),
    ((P::Thinking, V::ParallelAgents), (P::Streaming, &[ExtractAndSend])),
    ((P::Thinking, V::BackgroundTask), (P::Streaming, &[ExtractAndSend])),
    // ── Streaming ────────────────────────────────────────────────────────────
    ((P::Streaming, V::Streaming), (P::Streaming, &[ExtractAndSend])),
    ((P::Streaming, V::Idle), (P::Dormant, &[Finalize])),
    ((P::Streaming, V::ToolRequest), (P::ToolPending, &[Finalize, SendKeyboard])),
    ((P::Streaming, V::Thinking), (P::Thinking, &[Finalize, SendThinking])),
    ((P::Streaming, V::ToolRunning), (P::Streaming, &[ExtractAndSend])),
    ((P::Streaming, V::ToolResult), (P::Streaming, &[ExtractAndSend])),
    ((P::Streaming, V::Error), (P::Streaming, &[ExtractAndSend])),
    ((P::Streaming, V::AuthRequired), (P::Dormant, &[Finalize, SendAuthWarning])),
    ((P::Streaming, V::TodoList), (P::Streaming, &[ExtractAndSend])),
    ((P::Streaming, V::ParallelAgents), (P::Streaming, &[ExtractAndSend])),
    ((P::Streaming, V::BackgroundTask), (P::Streaming, &[ExtractAndSend])),
    // ── ToolPending ──────────────────────────────────────────────────────────
    ((P::ToolPending, V::ToolRunning), (P::Streaming, &[])),
    ((P::ToolPending, V::Streaming), (P::Streaming, &[ExtractAndSend])),
    ((P::ToolPending, V::Thinking), (P::Thinking, &[SendThinking])),
    ((P::ToolPending, V::Idle), (P::Dormant, &[])),
    ((P::ToolPending, V::ToolRequest), (P::ToolPending, &[])),
    ((P::ToolPending, V::AuthRequired), (P::Dormant, &[SendAuthWarning])),
    ((P::ToolPending, V::Error), (P::Streaming, &[ExtractAndSend])),
    ((P::ToolPending, V::TodoList), (P::Streaming, &[ExtractAndSend])),
    ((P::ToolPending, V::ParallelAgents), (P::Streaming, &[ExtractAndSend])),
    ((P::ToolPending, V::BackgroundTask), (P::Streaming, &[ExtractAndSend])),
];

/// Look up a transition; `None` means hold the phase and do nothing.
pub fn transition(
    phase: PipelinePhase,
    view: TerminalView,
) -> Option<(PipelinePhase, &'static [Action])> {
    TRANSITIONS
        .iter()
        .find(|((p, v), _)| *p == phase && *v == view)
        .map(|(_, result)| *result)
}

/// Per-session dedup of lines already shipped to chat.
///
/// A terminal scroll shifts every row, so the change tracker re-reports
/// text that was already sent; stripped-line identity filters it back out.
/// The set clears on a fresh user turn and is pre-seeded from the visible
/// display at startup and response boundaries so banner and prior-response
/// text never re-send.
#[derive(Debug, Default)]
pub struct ContentDedup {
    sent_lines: HashSet<String>,
}

impl ContentDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every visible non-blank line as already sent.
    pub fn seed_from_display(&mut self, display: &[String]) {
        for line in display {
            let stripped = line.trim();
            if !stripped.is_empty() {
                self.sent_lines.insert(stripped.to_string());
            }
        }
    }

    /// Forget everything; a new response cycle may legitimately repeat
    /// earlier phrasing.
    pub fn clear(&mut self) {
        self.sent_lines.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.sent_lines.is_empty()
    }

    /// Drop lines already sent; record and return the rest.  Blank lines
    /// pass through.  Returns `None` when nothing new remains.
    pub fn filter_new(&mut self, content: &str) -> Option<String> {
        let mut fresh: Vec<&str> = Vec::new();
        let mut any_content = false;
        for line in content.lines() {
            let stripped = line.trim();
            if stripped.is_empty() {
                fresh.push(line);
            } else if !self.sent_lines.contains(stripped) {
                self.sent_lines.insert(stripped.to_string());
                fresh.push(line);
                any_content = true;
            }
        }
        any_content.then(|| fresh.join("\n"))
    }
}

/// Everything one session's pipeline owns.
pub struct PipelineState {
    pub emulator: TerminalEmulator,
    pub streaming: StreamingMessage,
    pub phase: PipelinePhase,
    pub prev_view: Option<TerminalView>,
    /// The user already answered the approval menu; stale repaints of it
    /// are suppressed until the view moves on.
    pub tool_acted: bool,
    /// The one-shot auth warning was delivered.
    pub auth_warned: bool,
    pub dedup: ContentDedup,
}

impl PipelineState {
    pub fn new(emulator: TerminalEmulator, streaming: StreamingMessage) -> Self {
        Self {
            emulator,
            streaming,
            phase: PipelinePhase::Dormant,
            prev_view: None,
            tool_acted: false,
            auth_warned: false,
            dedup: ContentDedup::new(),
        }
    }
}

/// Registry of per-session pipeline state, keyed by `(user, session)`.
///
/// The supervisor holds the lock for the duration of a tick; callback
/// handlers take it briefly to flag tool approvals.
#[derive(Default)]
pub struct PipelineRegistry {
    pub(crate) states: Mutex<HashMap<(i64, u32), PipelineState>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that a tool approval callback was processed for a session.
    pub async fn mark_tool_acted(&self, user_id: i64, session_id: u32) {
        let mut states = self.states.lock().await;
        if let Some(state) = states.get_mut(&(user_id, session_id)) {
            state.tool_acted = true;
        }
    }

    /// Whether the session is still showing an unanswered approval menu.
    pub async fn is_tool_request_pending(&self, user_id: i64, session_id: u32) -> bool {
        let states = self.states.lock().await;
        states
            .get(&(user_id, session_id))
            .is_some_and(|s| !s.tool_acted && s.phase == PipelinePhase::ToolPending)
    }

    /// Drop a session's state, cancelling its typing task.
    pub async fn cleanup(&self, user_id: i64, session_id: u32) {
        self.states.lock().await.remove(&(user_id, session_id));
    }

    /// The visible display of one session's emulator, for commands that
    /// scrape the status bar.
    pub async fn display(&self, user_id: i64, session_id: u32) -> Option<Vec<String>> {
        let states = self.states.lock().await;
        states
            .get(&(user_id, session_id))
            .map(|s| s.emulator.get_display())
    }
}

/// Convenience constructor used by the supervisor and tests.
pub fn new_pipeline_state(
    chat: Arc<dyn ChatApi>,
    chat_id: i64,
    edit_rate_limit: u32,
    rows: u16,
    cols: u16,
    scrollback: usize,
) -> PipelineState {
    PipelineState::new(
        TerminalEmulator::new(rows, cols, scrollback),
        StreamingMessage::new(chat, chat_id, edit_rate_limit),
    )
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_all_dormant_starters() {
        for view in [
            V::Thinking,
            V::Streaming,
            V::ToolRequest,
            V::AuthRequired,
            V::Error,
            V::TodoList,
            V::ParallelAgents,
            V::BackgroundTask,
        ] {
            assert!(
                transition(P::Dormant, view).is_some(),
                "missing dormant transition for {view:?}"
            );
        }
    }

    #[test]
    fn unknown_pairs_hold_phase() {
        assert!(transition(P::Dormant, V::Unknown).is_none());
        assert!(transition(P::Dormant, V::Startup).is_none());
        assert!(transition(P::Dormant, V::UserMessage).is_none());
        assert!(transition(P::Dormant, V::Idle).is_none());
        assert!(transition(P::Thinking, V::Thinking).is_none());
    }

    #[test]
    fn thinking_to_idle_is_the_fast_path() {
        let (next, actions) = transition(P::Thinking, V::Idle).unwrap();
        assert_eq!(next, P::Dormant);
        assert_eq!(actions, &[ExtractAndSend, Finalize][..]);
    }

    #[test]
    fn streaming_to_tool_request_finalizes_first() {
        let (next, actions) = transition(P::Streaming, V::ToolRequest).unwrap();
        assert_eq!(next, P::ToolPending);
        assert_eq!(actions, &[Finalize, SendKeyboard][..]);
    }

    #[test]
    fn tool_pending_to_running_is_silent() {
        let (next, actions) = transition(P::ToolPending, V::ToolRunning).unwrap();
        assert_eq!(next, P::Streaming);
        assert!(actions.is_empty());
    }

    #[test]
    fn no_duplicate_table_keys() {
        let mut seen = HashSet::new();
        for ((phase, view), _) in TRANSITIONS {
            assert!(seen.insert((*phase, *view)), "duplicate entry {phase:?}/{view:?}");
        }
    }

    // ── Dedup ────────────────────────────────────────────────────────────────

    #[test]
    fn dedup_drops_reshipped_lines() {
        let mut dedup = ContentDedup::new();
        assert_eq!(
            dedup.filter_new("Line A\nLine B").as_deref(),
            Some("Line A\nLine B")
        );
        // The scroll re-reported A and B alongside the new C
        assert_eq!(
            dedup.filter_new("Line A\nLine B\nLine C").as_deref(),
            Some("Line C")
        );
        assert!(dedup.filter_new("Line A").is_none());
    }

    #[test]
    fn dedup_preserves_blank_lines_between_fresh_content() {
        let mut dedup = ContentDedup::new();
        let out = dedup.filter_new("one\n\ntwo").unwrap();
        assert_eq!(out, "one\n\ntwo");
    }

    #[test]
    fn seed_marks_visible_lines_as_sent() {
        let mut dedup = ContentDedup::new();
        dedup.seed_from_display(&["banner".to_string(), "".to_string()]);
        assert!(dedup.filter_new("banner").is_none());
        assert!(dedup.filter_new("new text").is_some());
    }

    #[test]
    fn clear_allows_reuse_in_next_turn() {
        let mut dedup = ContentDedup::new();
        dedup.filter_new("same phrase");
        dedup.clear();
        assert!(dedup.is_empty());
        assert_eq!(dedup.filter_new("same phrase").as_deref(), Some("same phrase"));
    }
}
