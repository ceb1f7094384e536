// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Transition-table-driven event processing for one session.
//!
//! Each call to [`PipelineRunner::process`] applies the overrides, looks
//! up `(phase, view)` in the table, runs the actions in order, then
//! advances the phase.  A `Forbidden` from any action kills the session;
//! every other failure is logged and the phase still advances, so one bad
//! chat call cannot wedge a session.

use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use ttygram_session::SessionManager;
use ttygram_term::{
    classify_regions, find_last_prompt, strip_response_markers, ScreenEvent, ScreenPayload,
    TerminalView,
};

use crate::chat::{ChatApi, ChatError, KeyboardLayout};
use crate::format::{escape_html, format_html, reflow, render_ansi, render_regions};
use crate::keyboards::build_tool_approval_keyboard;
use crate::pipeline::{transition, Action, PipelineState};

pub struct PipelineRunner<'a> {
    state: &'a mut PipelineState,
    user_id: i64,
    session_id: u32,
    chat: Arc<dyn ChatApi>,
    sessions: Arc<SessionManager>,
}

impl<'a> PipelineRunner<'a> {
    pub fn new(
        state: &'a mut PipelineState,
        user_id: i64,
        session_id: u32,
        chat: Arc<dyn ChatApi>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            state,
            user_id,
            session_id,
            chat,
            sessions,
        }
    }

    /// Process one screen event.  Returns `false` when the session was
    /// killed and processing must stop.
    pub async fn process(&mut self, event: ScreenEvent) -> bool {
        let event = self.apply_overrides(event);
        let view = event.view;
        let prev = self.state.prev_view;

        if Some(view) != prev {
            debug!(
                user = self.user_id,
                session = self.session_id,
                ?view,
                ?prev,
                phase = ?self.state.phase,
                "screen state changed"
            );
        } else {
            trace!(user = self.user_id, session = self.session_id, ?view, "screen state unchanged");
        }

        // Dedup bookkeeping on the observation itself: a fresh user turn
        // clears the set; the persistent banner is pre-seeded.
        match view {
            TerminalView::UserMessage => self.state.dedup.clear(),
            TerminalView::Startup => self.state.dedup.seed_from_display(&event.raw_lines),
            _ => {}
        }

        let (next_phase, actions) = match transition(self.state.phase, view) {
            Some(result) => result,
            None => {
                if !matches!(
                    view,
                    TerminalView::Unknown | TerminalView::Startup | TerminalView::UserMessage
                ) {
                    warn!(
                        phase = ?self.state.phase,
                        ?view,
                        "no transition; holding phase"
                    );
                }
                (self.state.phase, &[][..])
            }
        };

        for action in actions {
            if let Err(e) = self.run_action(*action, &event).await {
                match e {
                    ChatError::Forbidden => {
                        warn!(
                            user = self.user_id,
                            session = self.session_id,
                            "user blocked the bot; killing session"
                        );
                        if let Err(kill_err) =
                            self.sessions.kill_session(self.user_id, self.session_id).await
                        {
                            warn!("kill after Forbidden failed: {kill_err}");
                        }
                        return false;
                    }
                    other => {
                        error!(
                            ?action,
                            phase = ?self.state.phase,
                            ?view,
                            "action failed: {other}"
                        );
                    }
                }
            }
        }

        // Re-seed at the response boundary, AFTER extraction has run: the
        // visible remains of this response must never re-send when the
        // emulator scrolls, but seeding earlier would dedup the fast
        // THINKING→IDLE extraction against its own screen.
        if view == TerminalView::Idle && prev != Some(TerminalView::Idle) {
            self.state.dedup.seed_from_display(&event.raw_lines);
        }

        self.state.phase = next_phase;
        self.state.prev_view = Some(view);
        true
    }

    /// Suppress detections the emulator's persistence makes stale.
    fn apply_overrides(&mut self, event: ScreenEvent) -> ScreenEvent {
        // The banner persists in the emulator buffer; once any other view
        // was observed, STARTUP can only be a stale repaint.
        if event.view == TerminalView::Startup
            && self
                .state
                .prev_view
                .is_some_and(|prev| prev != TerminalView::Startup)
        {
            return event.into_unknown();
        }

        // The user already answered the approval menu; the painted menu
        // remains until the TUI moves on.
        if event.view == TerminalView::ToolRequest {
            if self.state.tool_acted {
                return event.into_unknown();
            }
        } else {
            self.state.tool_acted = false;
        }

        event
    }

    async fn run_action(&mut self, action: Action, event: &ScreenEvent) -> Result<(), ChatError> {
        match action {
            Action::SendThinking => self.state.streaming.start_thinking().await,
            Action::SendKeyboard => self.send_keyboard(event).await,
            Action::SendAuthWarning => self.send_auth_warning().await,
            Action::ExtractAndSend => self.extract_and_send().await,
            Action::Finalize => self.finalize().await,
        }
    }

    /// Quote the approval question and options, with an inline keyboard
    /// mapping each option to terminal input.
    async fn send_keyboard(&mut self, event: &ScreenEvent) -> Result<(), ChatError> {
        self.state.tool_acted = false;

        let (question, options, selected) = match &event.payload {
            ScreenPayload::ToolRequest(req) => (
                req.question
                    .clone()
                    .unwrap_or_else(|| "Tool approval requested".to_string()),
                req.options.clone(),
                req.selected,
            ),
            _ => ("Tool approval requested".to_string(), Vec::new(), 0),
        };

        let mut parts = vec![format!("<b>{}</b>", escape_html(&question))];
        for (i, option) in options.iter().enumerate() {
            parts.push(format!("  {}. {}", i + 1, escape_html(option)));
        }
        let keyboard: KeyboardLayout =
            build_tool_approval_keyboard(self.session_id, &options, selected);

        self.chat
            .send_message(self.user_id, &parts.join("\n"), Some(keyboard))
            .await?;
        Ok(())
    }

    /// One-shot auth notice, then kill the session: the login flow needs a
    /// real terminal on the host.
    async fn send_auth_warning(&mut self) -> Result<(), ChatError> {
        if self.state.auth_warned {
            return Ok(());
        }
        self.state.auth_warned = true;
        self.chat
            .send_message(
                self.user_id,
                "Claude Code requires authentication.\n\
                 Run <code>claude</code> in a terminal on the host to complete \
                 the login flow, then try again.",
                None,
            )
            .await?;
        warn!(
            user = self.user_id,
            session = self.session_id,
            "auth required; killing session"
        );
        if let Err(e) = self.sessions.kill_session(self.user_id, self.session_id).await {
            warn!("kill after auth warning failed: {e}");
        }
        Ok(())
    }

    /// Render the changed terminal lines and append them to the streaming
    /// message.
    async fn extract_and_send(&mut self) -> Result<(), ChatError> {
        let attr_changes = self.state.emulator.get_attributed_changes();
        if attr_changes.is_empty() {
            return Ok(());
        }

        let filtered = strip_response_markers(&attr_changes);
        if filtered.is_empty() {
            return Ok(());
        }

        let regions = classify_regions(&filtered);
        let html = format_html(&reflow(&render_regions(&regions)));
        if html.trim().is_empty() {
            return Ok(());
        }

        let Some(mut fresh) = self.state.dedup.filter_new(&html) else {
            return Ok(());
        };
        if !fresh.ends_with('\n') {
            fresh.push('\n');
        }
        self.state.streaming.append_content(&fresh).await
    }

    /// Re-render the full response from scrollback + screen so the
    /// finished message gets the best possible rendering, then close out
    /// the streaming message and drop consumed history.
    async fn finalize(&mut self) -> Result<(), ChatError> {
        if !self.state.streaming.accumulated.is_empty() {
            let full = self.state.emulator.get_full_display();
            let attr = self.state.emulator.get_full_attributed_lines();
            let (source, attr) = match find_last_prompt(&full) {
                Some(idx) => (&full[idx..], &attr[idx..]),
                None => (&full[..], &attr[..]),
            };
            let html = render_ansi(source, attr);
            if !html.trim().is_empty() {
                self.state.streaming.replace_content(html);
            }
        }
        self.state.streaming.finalize().await?;
        self.state.emulator.clear_history();
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
